use std::env;
use std::time::{Duration, Instant};

use anyhow::Result;
use muster::{DirectoryClient, POOL_ENV};
use muster_proto::{Ad, Query};
use owo_colors::{OwoColorize, Style};
use tracing_subscriber::EnvFilter;

mod args;

use args::Args;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut client = DirectoryClient::with_connection(args.pool.as_deref(), args.connection_type);

    let before = Instant::now();
    let ads = if args.local {
        let daemon_type = args.daemon_type.expect("Args::parse() requires a daemon type for +local");
        vec![client.locate_local(daemon_type)?]
    } else if let Some(name) = &args.name {
        let daemon_type = args
            .daemon_type
            .expect("Args::parse() requires a daemon type alongside a daemon name");
        vec![client.locate(daemon_type, name)?]
    } else {
        let query = Query::new(args.ad_type)
            .and_constraint(args.constraint.clone())
            .project(args.projection.clone());
        client.query(&query)?
    };
    let elapsed = before.elapsed();

    display_result(&ads, &args, &elapsed);

    Ok(())
}

fn display_result(ads: &[Ad], args: &Args, elapsed: &Duration) {
    let output = owo_colors::Stream::Stdout;

    #[cfg(feature = "json")]
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ads).unwrap());
        return;
    }

    if ads.is_empty() {
        println!("<no matching ads>");
    }
    for (i, ad) in ads.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", ad.as_string(args.pad_attrs, Some(output)));
    }

    if args.print_meta {
        let pool = match &args.pool {
            Some(pool) => pool.clone(),
            None => env::var(POOL_ENV).unwrap_or_else(|_| "<default pool>".to_string()),
        };
        let source = if args.local { "local probe" } else { pool.as_str() };
        let style = Style::new().green();

        println!();
        println!(
            "{} in {} ms",
            format!(
                "{} ad{} from {}",
                ads.len(),
                if ads.len() == 1 { "" } else { "s" },
                source
            )
            .if_supports_color(output, |s| s.style(style)),
            elapsed.as_millis()
        );
    }
}
