use super::{is_interactive, json_pretty, Context, EXIT_SUCCESS};
use console::Style;
use dialoguer::{Confirm, Password};
use shipyard_remote::{CredentialStore, SetupEntry};
use shipyard_schema::{RegistryConfig, ReleaseConfig};

pub fn run(ctx: &Context) -> Result<u8, String> {
    let config = ctx.load_config()?;
    if !is_interactive() {
        return Err("setup needs an interactive terminal".to_owned());
    }

    let store = CredentialStore::new(
        config.credentials_path(),
        config.credentials.placeholders.clone(),
    );

    let mut entries = Vec::new();
    for registry in prompt_order(&config) {
        if let Some(url) = &registry.token_url {
            eprintln!("create a {} token at {url}", registry.display());
        }
        if let Some(secret) = ask_token(registry)? {
            entries.push(SetupEntry::for_registry(registry, secret));
        }
    }

    if entries.is_empty() {
        println!("no tokens entered; {} left untouched", store.path().display());
        return Ok(EXIT_SUCCESS);
    }

    if store.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!(
                "overwrite {} (a backup is kept)?",
                store.path().display()
            ))
            .default(false)
            .interact()
            .map_err(|e| format!("prompt failed: {e}"))?;
        if !overwrite {
            return Err(format!(
                "refusing to overwrite existing {}",
                store.path().display()
            ));
        }
    }

    let summary = store.write_config(&entries).map_err(|e| e.to_string())?;

    if ctx.json {
        let payload = serde_json::json!({
            "status": "written",
            "path": summary.path,
            "backup": summary.backup,
            "registries": summary.registries,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        let green = Style::new().green();
        println!(
            "{} {} ({})",
            green.apply_to("wrote"),
            summary.path.display(),
            summary.registries.join(", ")
        );
        if let Some(backup) = &summary.backup {
            println!("previous file saved as {}", backup.display());
        }
    }
    Ok(EXIT_SUCCESS)
}

/// Production first, then test, then any other configured registry.
fn prompt_order(config: &ReleaseConfig) -> Vec<&RegistryConfig> {
    let mut ordered: Vec<&RegistryConfig> = Vec::new();
    for name in [&config.default_registry, &config.test_registry] {
        if let Some(registry) = config.registry(name) {
            if !ordered.iter().any(|r| r.name == registry.name) {
                ordered.push(registry);
            }
        }
    }
    for registry in config.registries.values() {
        if !ordered.iter().any(|r| r.name == registry.name) {
            ordered.push(registry);
        }
    }
    ordered
}

/// `Ok(None)` when the operator skips the registry.
fn ask_token(registry: &RegistryConfig) -> Result<Option<String>, String> {
    loop {
        let token = Password::new()
            .with_prompt(format!("{} token (blank to skip)", registry.display()))
            .allow_empty_password(true)
            .interact()
            .map_err(|e| format!("prompt failed: {e}"))?;
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        if token.starts_with(&registry.token_prefix) {
            return Ok(Some(token.to_owned()));
        }
        let keep = Confirm::new()
            .with_prompt(format!(
                "token does not start with '{}'; use it anyway?",
                registry.token_prefix
            ))
            .default(false)
            .interact()
            .map_err(|e| format!("prompt failed: {e}"))?;
        if keep {
            return Ok(Some(token.to_owned()));
        }
    }
}
