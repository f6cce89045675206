//! CLI argument definition and parsing.

use std::env;
use std::process;
use std::str::FromStr;

use muster::ConnectionType;
use muster_proto::{AdType, DaemonType};
use owo_colors::OwoColorize;

#[derive(Clone, Debug)]
pub struct Args {
    pub pool: Option<String>,
    pub ad_type: AdType,
    pub daemon_type: Option<DaemonType>,
    pub name: Option<String>,
    pub constraint: String,
    pub projection: Vec<String>,
    #[cfg(feature = "json")]
    pub json: bool,
    pub print_meta: bool,
    pub pad_attrs: bool,
    pub local: bool,
    pub connection_type: ConnectionType,
}

enum ConsumeNext {
    Constraint,
    Attr,
}

impl Args {
    pub fn parse() -> Self {
        // skip executable name
        let args: Vec<String> = env::args().skip(1).collect();

        let mut pool = None;
        let mut ad_type = AdType::Any;
        let mut daemon_type = None;
        let mut name = None;
        let mut constraint = String::new();
        let mut projection = Vec::new();
        #[cfg(feature = "json")]
        let mut json = false;
        let mut print_meta = true;
        let mut pad_attrs = true;
        let mut local = false;
        let mut connection_type = ConnectionType::Tcp;

        let mut consume_next = None;

        for arg in args {
            if let Some(to_consume) = &consume_next {
                match to_consume {
                    ConsumeNext::Constraint => constraint = arg,
                    ConsumeNext::Attr => projection.push(arg),
                }
                consume_next = None;
            } else if let Some(p) = arg.strip_prefix('@') {
                // pool
                pool = Some(p.to_string());
            } else if let Some(flag) = arg.strip_prefix('+') {
                // flags
                match flag {
                    #[cfg(feature = "json")]
                    "json" => {
                        json = true;
                    }
                    "no-meta" => {
                        print_meta = false;
                    }
                    "no-padding" => {
                        pad_attrs = false;
                    }
                    "local" => {
                        local = true;
                    }
                    "tcp" => {
                        connection_type = ConnectionType::Tcp;
                    }
                    "udp" => {
                        connection_type = ConnectionType::Udp;
                    }
                    x => {
                        err(format!("Invalid flag: +{}.", x));
                    }
                }
            } else if let Some(option) = arg.strip_prefix('-') {
                // options
                match option {
                    "h" | "-help" => {
                        print_help();
                        process::exit(0);
                    }
                    "V" | "-version" => {
                        print_version();
                        process::exit(0);
                    }
                    "c" | "-constraint" => {
                        consume_next = Some(ConsumeNext::Constraint);
                    }
                    "a" | "-attr" => {
                        consume_next = Some(ConsumeNext::Attr);
                    }
                    x => {
                        err(format!("Invalid option: -{}.", x));
                    }
                }
            } else if let Ok(d) = DaemonType::from_str(&arg) {
                daemon_type = Some(d);
                ad_type = AdType::from(d);
            } else if let Ok(t) = AdType::from_str(&arg) {
                ad_type = t;
            } else {
                // use the daemon name as fallback
                name = Some(arg);
            }
        }

        if consume_next.is_some() {
            err("Missing value for -c/-a option.");
        }
        if local && daemon_type.is_none() {
            err("The +local flag requires a daemon type.");
        }
        if local && name.is_some() {
            err("Cannot use both +local and a daemon name.");
        }
        if name.is_some() && daemon_type.is_none() {
            err("Locating a daemon by name requires a daemon type.");
        }
        if name.is_some() && (!constraint.is_empty() || !projection.is_empty()) {
            err("A constraint or projection cannot be combined with locating a daemon by name.");
        }

        Self {
            pool,
            ad_type,
            daemon_type,
            name,
            constraint,
            projection,
            #[cfg(feature = "json")]
            json,
            print_meta,
            pad_attrs,
            local,
            connection_type,
        }
    }
}

macro_rules! var {
    ($var:expr) => {
        $var.if_supports_color(owo_colors::Stream::Stdout, |s| s.green())
    };
}

macro_rules! printopt {
    ($opt:expr, $desc:expr) => {
        println!(
            "\t    {:<22} ({})",
            $opt.if_supports_color(owo_colors::Stream::Stdout, |s| s.yellow()),
            $desc,
        )
    };
}

macro_rules! printflag {
    ($flag:expr, $desc:expr) => {
        println!(
            "\t    {:<12} ({})",
            $flag.if_supports_color(owo_colors::Stream::Stdout, |s| s.yellow()),
            $desc,
        )
    };
}

fn print_help() {
    let output = owo_colors::Stream::Stdout;
    print!("{}", "Usage:".if_supports_color(output, |s| s.purple()));
    println!(
        "\tmuster [@{}] [{}] [{}] [{}] [{}]",
        var!("pool"),
        var!("type"),
        var!("name"),
        var!("options"),
        var!("flags")
    );
    println!();

    println!("{}", "Where:".if_supports_color(output, |s| s.purple()));

    println!(
        "\t{} is the host[:port] of the directory-service pool to query;\n\tif not given, the {} environment variable is used",
        var!("pool"),
        var!("MUSTER_POOL")
    );
    println!();

    println!(
        "\t{} is a daemon type (master, start, schedule, negotiator, directory)\n\tor an ad type (any, generic, submitter, ...); the default is {}",
        var!("type"),
        var!("any")
    );
    println!();

    println!(
        "\t{} is the logical name of one daemon to locate; requires a daemon type",
        var!("name")
    );
    println!();

    println!("\t{} is one or more of the following:", var!("options"));
    printopt!("-h | --help", "print this help message");
    printopt!("-V | --version", "print the version of muster");
    printopt!("-c | --constraint <expr>", "restrict the query to matching ads");
    printopt!(
        "-a | --attr <attr>",
        "project the result onto this attribute; may be repeated"
    );
    println!();

    println!("\t{} is one or more of the following:", var!("flags"));
    #[cfg(feature = "json")]
    printflag!("+json", "format output as JSON");
    printflag!("+no-meta", "don't print the result summary line");
    printflag!("+no-padding", "don't pad attribute names");
    printflag!("+local", "probe the local daemon instead of querying the pool");
    printflag!("+tcp", "query over TCP (the default)");
    printflag!("+udp", "query over UDP");
    println!();

    println!("Note: the order of the arguments does not matter.");
    println!();

    println!(
        "If no arguments are specified, every ad of the default pool is fetched,\ni.e. `{}`.",
        "muster any".if_supports_color(output, |s| s.green())
    );
    println!();

    println!(
        "Output is colourized by default. This can be tuned using the {}/\n{} environment variables.",
        var!("FORCE_COLOR"),
        var!("NO_COLOR")
    );
}

fn print_version() {
    println!("muster v{}", env!("CARGO_PKG_VERSION"));
}

fn err(msg: impl AsRef<str>) -> ! {
    eprintln!("{}", msg.as_ref());
    process::exit(1)
}
