use std::{env, fs::File, io::BufReader, path::PathBuf, process};

use getopts::Options;
use json_validator::Validator;
use serde_json::Value;

const BRIEF: &str = "Usage: jsonval [OPTIONS] SCHEMA [INSTANCE...]";

fn main() {
    let opts = options();
    let matches = match opts.parse(env::args().skip(1)) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{f}");
            eprintln!();
            eprintln!("{}", opts.usage(BRIEF));
            process::exit(1)
        }
    };

    if matches.opt_present("version") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        process::exit(0);
    }

    if matches.opt_present("help") {
        println!("{}", opts.usage(BRIEF));
        process::exit(0);
    }

    let quiet = matches.opt_present("quiet");

    let Some(schema) = matches.free.first() else {
        eprintln!("missing SCHEMA");
        eprintln!();
        eprintln!("{}", opts.usage(BRIEF));
        process::exit(1);
    };

    let mut config = json_validator::Options::from_env();
    if matches.opt_present("coerce") {
        config.coerce = true;
    }
    if let Some(dir) = matches.opt_str("cache-dir") {
        config.cache_dir = Some(PathBuf::from(dir));
    }

    let mut validator = Validator::with_options(config);
    match validator.set_schema(schema.as_str()) {
        Ok(_) => println!("schema {schema}: ok"),
        Err(e) => {
            println!("schema {schema}: failed");
            if !quiet {
                println!("{e}");
            }
            process::exit(2);
        }
    }

    let mut all_valid = true;
    for instance in &matches.free[1..] {
        if !quiet {
            println!();
        }
        let rdr = match File::open(instance) {
            Ok(rdr) => BufReader::new(rdr),
            Err(e) => {
                println!("instance {instance}: failed");
                if !quiet {
                    println!("error reading file {instance}: {e}");
                }
                all_valid = false;
                continue;
            }
        };
        let value: Result<Value, String> =
            if instance.ends_with(".yaml") || instance.ends_with(".yml") {
                serde_yaml::from_reader(rdr).map_err(|e| e.to_string())
            } else {
                serde_json::from_reader(rdr).map_err(|e| e.to_string())
            };
        let value = match value {
            Ok(v) => v,
            Err(e) => {
                println!("instance {instance}: failed");
                if !quiet {
                    println!("error parsing file {instance}: {e}");
                }
                all_valid = false;
                continue;
            }
        };
        let errors = validator.validate(&value);
        if errors.is_empty() {
            println!("instance {instance}: ok");
        } else {
            println!("instance {instance}: failed");
            if !quiet {
                for e in &errors {
                    println!("{e}");
                }
            }
            all_valid = false;
        }
    }
    if !all_valid {
        process::exit(2);
    }
}

fn options() -> Options {
    let mut opts = Options::new();
    opts.optflag("v", "version", "Print version and exit");
    opts.optflag("h", "help", "Print help information");
    opts.optflag("q", "quiet", "Do not print errors");
    opts.optflag(
        "c",
        "coerce",
        "Accept numeric strings for numbers and numbers for strings",
    );
    opts.optopt(
        "",
        "cache-dir",
        "Directory for the on-disk copy of remote schemas",
        "<DIR>",
    );
    opts
}
