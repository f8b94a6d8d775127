//! Model listing functionality

use std::error::Error;
use std::io::Write;

use crate::core::app::ChatApp;
use crate::core::error::{ChatError, Precondition};

pub async fn list_models(app: &mut ChatApp, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    if app.api_key().is_empty() {
        return Err(ChatError::from(Precondition::NoCredential).into());
    }

    let current = app.model().to_string();
    let models = app.refresh_models().await.to_vec();

    writeln!(out, "🤖 Available chat models")?;
    writeln!(out, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
    writeln!(out)?;
    if models.is_empty() {
        writeln!(out, "No chat models found (run with CHATDECK_LOG=chatdeck=debug for details).")?;
        return Ok(());
    }
    for model in &models {
        if *model == current {
            writeln!(out, "  • {model} (selected)")?;
        } else {
            writeln!(out, "  • {model}")?;
        }
    }
    Ok(())
}
