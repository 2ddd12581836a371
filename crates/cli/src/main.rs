use anyhow::{Context, Result, bail};
use cmdflags::{FlagEnvironment, FlagInfo, define_flag, define_validator};
use tracing_subscriber::{EnvFilter, fmt};

define_flag!(TIMEOUT: i32 = 30, "timeout", "Request timeout in seconds");
define_flag!(VERBOSE: bool = false, "verbose", "List every flag after parsing");
define_flag!(GREETING: String = "hello", "greeting", "Text printed before the inputs");
define_flag!(SAMPLE_RATIO: f64 = 0.5, "sample_ratio", "Fraction of inputs to sample");
define_flag!(DUMP_FLAGS: bool = false, "dump_flags", "Print the flag table as JSON and exit");
define_flag!(VERSION: bool = false, "version", "Print the version and exit");

fn positive(_: &str, value: i32) -> bool {
    value > 0
}

define_validator!(TIMEOUT, positive);

fn main() -> Result<()> {
    init_tracing();

    let env = FlagEnvironment::global();
    env.set_usage_message("cmdflags-demo [flags] [inputs...]");
    env.set_version_string(env!("CARGO_PKG_VERSION"));

    let mut args: Vec<String> = std::env::args().collect();
    let outcome = env.parse_command_line_flags(&mut args, true);
    for warning in outcome.report.warnings() {
        eprintln!("warning: {warning}");
    }
    if let Err(errors) = outcome.report.into_result() {
        eprintln!("{errors}");
        eprintln!("usage: {}", env.usage_message());
        bail!(
            "invalid command line for {}",
            env.program_invocation_short_name()
        );
    }

    if VERSION.get() {
        println!(
            "{} {}",
            env.program_invocation_short_name(),
            env.version_string()
        );
        return Ok(());
    }

    if DUMP_FLAGS.get() {
        let flags = env.registry().flags();
        let json = serde_json::to_string_pretty(&flags).context("failed to serialize flag table")?;
        println!("{json}");
        return Ok(());
    }

    println!("timeout={}", TIMEOUT.get());
    let ratio = env
        .value_of(SAMPLE_RATIO.name())
        .context("sample_ratio is not registered")?;
    println!("sample_ratio={ratio}");

    let inputs: Vec<&str> = args.iter().skip(1).map(String::as_str).collect();
    if inputs.is_empty() {
        println!("{}", GREETING.get());
    } else {
        println!("{} {}", GREETING.get(), inputs.join(" "));
    }

    if VERBOSE.get() {
        for flag in env.registry().flags() {
            println!("{}", describe(&flag));
        }
    }

    tracing::debug!(inputs = inputs.len(), "done");
    cmdflags::shut_down_command_line_flags();
    Ok(())
}

fn describe(flag: &FlagInfo) -> String {
    let marker = if flag.is_default() { "" } else { " (changed)" };
    format!(
        "--{} ({}) = {}{marker}: {}",
        flag.name, flag.kind, flag.current_value, flag.description
    )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
