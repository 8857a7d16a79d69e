//! `nutri classify` and `nutri chat`.

use anyhow::{Context, Result};

use nutri_core::{IntentRouter, NutriSettings, SpecialistRegistry};

/// Print the condition `text` routes to, or every matching condition.
pub fn run_classify(text: &str, all: bool) -> Result<()> {
    let router = IntentRouter::standard();
    if all {
        let matches = router.matches(text);
        if matches.is_empty() {
            println!("(no specialist matched; routes to general)");
        }
        for condition in matches {
            println!("{condition}");
        }
    } else {
        println!("{}", router.classify(text));
    }
    Ok(())
}

/// Route `text` to a specialist and print its reply.
pub async fn run_chat(settings: &NutriSettings, text: &str, json: bool) -> Result<()> {
    let registry = SpecialistRegistry::from_settings(settings);
    let reply = registry.chat(text).await;

    if json {
        let out = serde_json::to_string_pretty(&reply).context("failed to serialize reply")?;
        println!("{out}");
    } else {
        println!("[{}]", reply.provider);
        println!("{}", reply.reply);
    }
    Ok(())
}
