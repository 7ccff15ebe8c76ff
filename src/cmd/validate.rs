//! `director validate`: check a configuration file for errors.
//!
//! Parses and validates the config file, reporting the primary/secondary
//! split in human-readable text or the result as JSON.

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::{self, validation};
use crate::error::DirectorError;

pub async fn execute(args: &ValidateArgs) -> Result<(), DirectorError> {
    let path = &args.config;
    let raw = config::load_file(path).await?;

    let validated = match validation::validate(raw.as_ref()) {
        Ok(validated) => validated,
        Err(error) => {
            match args.format {
                ValidateFormat::Text => {
                    eprintln!("\u{2717} {} is invalid\n", path.display());
                    eprintln!("{error}");
                }
                ValidateFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "valid": false,
                            "error": {
                                "field": error.field,
                                "message": error.message,
                                "suggestion": error.suggestion,
                            },
                        })
                    );
                }
            }
            return Err(DirectorError::ConfigValidation(error));
        }
    };

    match args.format {
        ValidateFormat::Text => {
            println!(
                "\u{2713} {}",
                validation::format_validation_report(&path.display().to_string(), &validated)
            );
        }
        ValidateFormat::Json => {
            let secondaries: Vec<&str> = validated
                .secondaries
                .iter()
                .map(|b| b.id.as_str())
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "valid": true,
                    "port": validated.port,
                    "primary": validated.primary.id,
                    "secondaries": secondaries,
                })
            );
        }
    }

    Ok(())
}
