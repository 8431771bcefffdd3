use super::{Context, EXIT_FAILURE, EXIT_SUCCESS};
use shipyard_remote::{CredentialStore, DEFAULT_USERNAME};
use shipyard_runtime::{check_tools, PathResolver, RuntimeError};
use shipyard_schema::{RegistryConfig, ReleaseConfig, VersionStore};

pub fn run(ctx: &Context) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let config = match ctx.load_config() {
        Ok(config) => {
            if ctx.config_path.exists() {
                checks.push(Check::pass(
                    "config",
                    &format!("Configuration loaded from {}", ctx.config_path.display()),
                ));
            } else {
                checks.push(Check::info(
                    "config",
                    &format!(
                        "No configuration at {} (using defaults)",
                        ctx.config_path.display()
                    ),
                ));
            }
            config
        }
        Err(e) => {
            checks.push(Check::fail("config", &e));
            return print_results(&checks, false, ctx.json);
        }
    };

    check_environment(&config, &mut checks, &mut all_pass);
    check_manifests(ctx, &config, &mut checks, &mut all_pass);
    check_credentials(&config, &mut checks, &mut all_pass);

    print_results(&checks, all_pass, ctx.json)
}

fn check_environment(config: &ReleaseConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match check_tools(&PathResolver::new(), &config.required_tools()) {
        Ok(tools) => {
            for tool in tools {
                checks.push(Check::pass(
                    "tools",
                    &format!("{} found at {}", tool.name, tool.path.display()),
                ));
            }
        }
        Err(RuntimeError::MissingDependencies { missing }) => {
            *all_pass = false;
            for tool in missing {
                checks.push(Check::fail(
                    "tools",
                    &format!("{} not found (install: {})", tool.name, tool.install_hint),
                ));
            }
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("tools", &format!("Tool check failed: {e}")));
        }
    }
}

fn check_manifests(
    ctx: &Context,
    config: &ReleaseConfig,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) {
    let store = match VersionStore::from_paths(&ctx.root, &config.package.manifests) {
        Ok(store) => store,
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("manifests", &e.to_string()));
            return;
        }
    };

    let mut versions = Vec::new();
    for (manifest, result) in store.read_all() {
        match result {
            Ok(version) => {
                checks.push(Check::pass(
                    "manifests",
                    &format!("{}: version {version}", manifest.path().display()),
                ));
                versions.push(version);
            }
            Err(e) => {
                *all_pass = false;
                checks.push(Check::fail("manifests", &e.to_string()));
            }
        }
    }

    // Consistency only means something when every manifest was readable.
    if versions.len() == store.manifests().len() {
        versions.sort_unstable();
        versions.dedup();
        if versions.len() > 1 {
            *all_pass = false;
            let listed: Vec<String> = versions.iter().map(ToString::to_string).collect();
            checks.push(Check::fail(
                "version_consistency",
                &format!("Manifests disagree on the version: {}", listed.join(", ")),
            ));
        } else {
            checks.push(Check::pass(
                "version_consistency",
                "All manifests carry the same version",
            ));
        }
    }
}

fn check_credentials(config: &ReleaseConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let store = CredentialStore::new(
        config.credentials_path(),
        config.credentials.placeholders.clone(),
    );
    if !store.exists() {
        checks.push(Check::warn(
            "credentials",
            &format!(
                "No credential file at {} (run `shipyard setup`)",
                store.path().display()
            ),
        ));
        return;
    }

    let registries: Vec<&RegistryConfig> = config.registries.values().collect();
    match store.inspect(&registries) {
        Ok(statuses) => {
            for status in statuses {
                let label = format!("{} [{}]", status.display_name, status.registry);
                if status.valid {
                    checks.push(Check::pass(
                        "credentials",
                        &format!(
                            "{label}: {} {}",
                            status.username.as_deref().unwrap_or(DEFAULT_USERNAME),
                            status.masked_secret.as_deref().unwrap_or("")
                        ),
                    ));
                    continue;
                }
                let problem = status.problem.unwrap_or_else(|| "not usable".to_owned());
                if status.registry == config.default_registry {
                    *all_pass = false;
                    checks.push(Check::fail("credentials", &format!("{label}: {problem}")));
                } else {
                    checks.push(Check::warn("credentials", &format!("{label}: {problem}")));
                }
            }
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("credentials", &e.to_string()));
            return;
        }
    }

    match store.permissions_ok() {
        Ok(true) => checks.push(Check::pass(
            "credential_permissions",
            "Credential file is readable by its owner only",
        )),
        Ok(false) => checks.push(Check::warn(
            "credential_permissions",
            &format!(
                "Credential file {} is readable by others (chmod 600 it)",
                store.path().display()
            ),
        )),
        Err(e) => checks.push(Check::warn(
            "credential_permissions",
            &format!("Cannot check permissions: {e}"),
        )),
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Shipyard Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
