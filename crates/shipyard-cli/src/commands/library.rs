use super::{json_pretty, Context, EXIT_FAILURE, EXIT_SUCCESS};
use shipyard_schema::LibraryTable;

pub fn run(
    ctx: &Context,
    system: Option<&str>,
    arch: Option<&str>,
    list: bool,
) -> Result<u8, String> {
    let config = ctx.load_config()?;
    let table = LibraryTable::with_overrides(&config.libraries);

    if list {
        if ctx.json {
            let entries: serde_json::Map<String, serde_json::Value> = table
                .entries()
                .map(|(key, url)| (key.to_owned(), serde_json::Value::from(url)))
                .collect();
            println!("{}", json_pretty(&entries)?);
        } else {
            for (key, url) in table.entries() {
                println!("{key:<12} {url}");
            }
        }
        return Ok(EXIT_SUCCESS);
    }

    let (Some(system), Some(arch)) = (system, arch) else {
        return Err("library lookup needs <system> and <arch>, or --list".to_owned());
    };
    let key = LibraryTable::key(system, arch);
    match table.get(system, arch) {
        Some(url) => {
            if ctx.json {
                let payload = serde_json::json!({ "key": key, "url": url });
                println!("{}", json_pretty(&payload)?);
            } else {
                println!("{url}");
            }
            Ok(EXIT_SUCCESS)
        }
        None => {
            eprintln!("no library known for {key}");
            Ok(EXIT_FAILURE)
        }
    }
}
