use cmdflags::{FlagError, FlagRegistry, FlagSaver, define_flag, define_validator};
use serial_test::serial;

define_flag!(LEVEL: i32 = 0, "level", "Detail level; must be positive");
define_flag!(pub(crate) QUIET: bool = true, "quiet", "Suppress progress output");
define_flag!(OUTPUT: String = "out.txt", "output_path", "Where to write the report");
define_flag!(
    /// Multiplier applied to every sample.
    SCALE: f64 = 1.5,
    "scale",
    "Scale factor"
);

fn positive(_: &str, value: i32) -> bool {
    value > 0
}

define_validator!(LEVEL, positive);

fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

#[test]
#[serial]
fn static_flags_join_the_global_registry() {
    let registry = FlagRegistry::global();
    let level = registry.flag_info("level").expect("level not registered");
    assert!(level.has_validator);
    assert!(level.origin.ends_with("static_flags.rs"), "{}", level.origin);
    assert_eq!(level.description, "Detail level; must be positive");

    assert_eq!(registry.value_of("output_path").as_deref(), Some("out.txt"));
    assert_eq!(registry.value_of("scale").as_deref(), Some("1.5"));
    assert_eq!(
        registry.lock().find_by_storage(QUIET.storage_id()).map(|f| f.name().to_string()),
        Some("quiet".to_string())
    );
}

#[test]
#[serial]
fn parsing_writes_static_storage() {
    let _saver = FlagSaver::new();
    let mut argv = args(&[
        "prog",
        "--level=3",
        "data.csv",
        "--noquiet",
        "--output-path",
        "report.csv",
        "-scale=2",
    ]);
    let outcome = cmdflags::parse_command_line_flags(&mut argv, true);
    assert!(!outcome.report.has_errors(), "{:?}", outcome.report.errors());
    assert_eq!(outcome.first_positional, 6);
    assert_eq!(argv, ["prog", "data.csv"]);

    assert_eq!(LEVEL.get(), 3);
    assert!(!QUIET.get());
    assert_eq!(OUTPUT.get(), "report.csv");
    assert_eq!(SCALE.get(), 2.0);
    assert_eq!(cmdflags::value_of("level").as_deref(), Some("3"));
}

#[test]
#[serial]
fn saver_restores_static_flags() {
    {
        let _saver = FlagSaver::new();
        LEVEL.set(9);
        OUTPUT.set("elsewhere".to_string());
    }
    assert_eq!(LEVEL.get(), 0);
    assert_eq!(OUTPUT.get(), "out.txt");
}

#[test]
#[serial]
fn untouched_default_fails_validation() {
    let _saver = FlagSaver::new();
    let mut argv = args(&["prog", "--quiet"]);
    let outcome = cmdflags::parse_command_line_flags(&mut argv, false);
    assert_eq!(
        outcome.report.errors().get("level"),
        Some(&FlagError::MustBeSet {
            name: "level".to_string(),
            default_fails: true,
        })
    );
    let message = outcome.report.into_result().unwrap_err().to_string();
    assert_eq!(
        message,
        "--level must be set on the commandline (default value fails validation)"
    );
}

#[test]
#[serial]
fn fresh_registry_sees_the_same_statics() {
    let fresh = FlagRegistry::with_static_flags();
    assert_eq!(fresh.flags().len(), FlagRegistry::global().flags().len());
    assert_eq!(
        fresh.lock().find("level").map(|f| f.storage_id()),
        Some(LEVEL.storage_id())
    );
}
