use super::{json_pretty, Context, EXIT_SUCCESS};
use shipyard_schema::{BumpKind, VersionError, VersionStore};

/// Print the current version and, given a bump, the version a release would
/// write. Nothing is modified.
pub fn run(ctx: &Context, bump: Option<&str>) -> Result<u8, String> {
    let config = ctx.load_config()?;
    let bump: Option<BumpKind> = bump
        .map(str::parse)
        .transpose()
        .map_err(|e: VersionError| e.to_string())?;

    let store = VersionStore::from_paths(&ctx.root, &config.package.manifests)
        .map_err(|e| e.to_string())?;
    let current = store.read().map_err(|e| e.to_string())?;
    let target = bump
        .map(|kind| current.bump(kind))
        .transpose()
        .map_err(|e| e.to_string())?;

    if ctx.json {
        let payload = serde_json::json!({
            "package": config.package.name,
            "manifest": store.primary().path(),
            "current": current,
            "target": target,
        });
        println!("{}", json_pretty(&payload)?);
    } else if let Some(target) = target {
        println!("{} {current} -> {target}", config.package.name);
    } else {
        println!("{} {current}", config.package.name);
    }
    Ok(EXIT_SUCCESS)
}
