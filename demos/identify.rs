use std::env;

use romkit::{Config, Result, RomFactory};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1).peekable();
    let config = if args.peek().map(String::as_str) == Some("--config") {
        args.next();
        match args.next() {
            Some(path) => Config::load(path)?,
            None => {
                eprintln!("usage: identify [--config romkit.toml] FILE...");
                return Ok(());
            }
        }
    } else {
        Config::default()
    };

    let factory = RomFactory::new(config);
    for path in args {
        let Some(rom) = factory.open_path(&path)? else {
            println!("{path}: unrecognized");
            continue;
        };
        println!("{path}: {}", rom.system_name().unwrap_or("?"));

        match rom.fields() {
            Ok(fields) => {
                for field in fields.iter() {
                    println!("  {}: {}", field.name, field.value);
                }
            }
            Err(e) => println!("  fields unavailable: {e}"),
        }
        if let Ok(meta) = rom.metadata() {
            for (prop, value) in meta.iter() {
                println!("  [{prop:?}] {value}");
            }
        }
        for &kind in rom.supported_images() {
            let status = if rom.image(kind).is_ok() { "ok" } else { "failed" };
            println!("  image {kind:?}: {status}");
        }
    }

    Ok(())
}
