use std::env;

mod scenarios;

type AnyResult<T> = Result<T, String>;

struct Args {
    list: bool,
    json: bool,
    requested: Option<String>,
}

pub(crate) struct Options {
    pub(crate) json: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> AnyResult<()> {
    let args = parse_args()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if args.list {
        for scenario in scenarios::ALL {
            println!("{:<16} {}", scenario.name, scenario.description);
        }
        return Ok(());
    }

    let options = Options { json: args.json };
    match args.requested {
        Some(requested) => {
            let scenario = resolve_requested(&requested)?;
            (scenario.run)(&options)
        }
        None => {
            for scenario in scenarios::ALL {
                if !options.json {
                    println!("== {} ==", scenario.name);
                }
                (scenario.run)(&options)?;
            }
            Ok(())
        }
    }
}

fn parse_args() -> AnyResult<Args> {
    let mut args = env::args().skip(1);
    let mut list = false;
    let mut json = false;
    let mut requested: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--list" => {
                list = true;
            }
            "--json" => {
                json = true;
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option '{arg}'"));
            }
            _ => {
                if requested.is_some() {
                    return Err("Too many arguments".to_owned());
                }
                requested = Some(arg);
            }
        }
    }

    Ok(Args {
        list,
        json,
        requested,
    })
}

fn print_help() {
    eprintln!("Usage: peeps-examples [--list] [--json] [scenario-name]");
}

fn resolve_requested(requested: &str) -> AnyResult<&'static scenarios::Scenario> {
    if let Some(exact) = scenarios::ALL.iter().find(|s| s.name == requested) {
        return Ok(exact);
    }

    let needle = requested.to_lowercase();
    if let Some(close) = scenarios::ALL.iter().find(|s| s.name.contains(&needle)) {
        eprintln!("Using closest scenario match '{}' for '{requested}'.", close.name);
        return Ok(close);
    }

    eprintln!("Unknown scenario '{requested}'. Available scenarios:");
    for scenario in scenarios::ALL {
        eprintln!("{}", scenario.name);
    }
    Err("No matching scenario found".to_owned())
}
