use clap::{Arg, Command};

pub const CMD_ROTATE_KEYS: &str = "rotate-keys";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("keys-current-path")
                .long("keys-current-path")
                .help("JWKS file with the keys new tokens are signed with")
                .default_value("keys/current.json")
                .env("KEYWARD_KEYS_CURRENT_PATH")
                .global(true),
        )
        .arg(
            Arg::new("keys-legacy-path")
                .long("keys-legacy-path")
                .help("JWKS file with keys retired by the last rotation")
                .default_value("keys/legacy.json")
                .env("KEYWARD_KEYS_LEGACY_PATH")
                .global(true),
        )
        .arg(
            Arg::new("keys-cache-ttl-seconds")
                .long("keys-cache-ttl-seconds")
                .help("How long loaded signing keys are served before the files are re-read")
                .default_value("300")
                .env("KEYWARD_KEYS_CACHE_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .subcommand(rotate_keys())
}

fn rotate_keys() -> Command {
    Command::new(CMD_ROTATE_KEYS)
        .about("Retire the current signing keys to legacy and generate a new RS256 key")
        .arg(
            Arg::new("kid")
                .long("kid")
                .help("Key id of the new signing key")
                .required(true),
        )
        .arg(
            Arg::new("bits")
                .long("bits")
                .help("RSA modulus size")
                .default_value("2048")
                .value_parser(clap::value_parser!(u64).range(2048..)),
        )
}
