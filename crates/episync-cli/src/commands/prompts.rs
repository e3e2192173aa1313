use color_eyre::Result;
use dialoguer::{Input, Password};

/// Prompt for a non-empty value, offering `default` when there is one
pub fn prompt_string(prompt: &str, default: Option<&str>) -> Result<String> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default_value) = default {
        input = input.default(default_value.to_string());
    }
    let value = input
        .interact_text()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read input: {}", e))?;
    Ok(value.trim().to_string())
}

/// Prompt for a secret without echoing it
pub fn prompt_secret(prompt: &str) -> Result<String> {
    let value = Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read secret: {}", e))?;
    Ok(value.trim().to_string())
}

/// Checks shared by the client id, secret and token prompts
pub fn validate_credential(input: &str, what: &str) -> Result<()> {
    if input.is_empty() {
        return Err(color_eyre::eyre::eyre!("{} cannot be empty", what));
    }
    if input.chars().any(char::is_whitespace) {
        return Err(color_eyre::eyre::eyre!("{} must not contain whitespace", what));
    }
    Ok(())
}
