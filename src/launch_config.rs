//! Turns a raw [`ConfigMap`] into a validated, immutable [`LaunchConfig`].
//!
//! Every check happens here, before the splash screen is shown or any
//! process is spawned. Optional keys fall back to their defaults when
//! absent, but a value that is present and wrong is always an error.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigMap;
use crate::launcher::{self, ProgramSpec};
use crate::navision::NavisionArgs;
use crate::wait::{DEFAULT_POLL_INTERVAL, WaitPolicy};

pub const CONFIG: &str = "CONFIG";
pub const LAUNCH: &str = "LAUNCH";

/// Value that switches an optional setting off.
pub const SENTINEL: &str = "0";

pub const DEFAULT_SPLASH_DWELL: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("[{section}] {key} is required")]
    MissingRequiredField {
        section: &'static str,
        key: &'static str,
    },

    #[error("[{section}] {key} points to {path:?}, which does not exist")]
    ReferencedPathNotFound {
        section: &'static str,
        key: &'static str,
        path: String,
    },

    #[error("[{section}] {key} is enabled but {missing} is not set")]
    OptionalGroupIncomplete {
        section: &'static str,
        key: &'static str,
        missing: &'static str,
    },

    #[error("[{section}] {key} has invalid value {value:?}, expected {expected}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Text and colours for the splash screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub title_text: String,
    pub loading_text: String,
    pub title_color: String,
    pub loading_color: String,
    pub background_color: String,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            title_text: "Please wait".to_string(),
            loading_text: "Loading application...".to_string(),
            title_color: "White".to_string(),
            loading_color: "Gray".to_string(),
            background_color: "DarkBlue".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFirst {
    pub exe_path: PathBuf,
    pub args: Option<String>,
    pub wait_for_exit: bool,
}

impl RunFirst {
    pub fn program(&self) -> ProgramSpec {
        ProgramSpec {
            path: self.exe_path.clone(),
            args: self.args.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub command_path: PathBuf,
    pub command_args: Option<String>,
    pub wait_for_logon_process: Option<String>,
    pub run_first: Option<RunFirst>,
    pub import_registry_file: Option<PathBuf>,
    pub presentation: Presentation,
    pub wait_policy: WaitPolicy,
    pub splash_dwell: Duration,
}

impl LaunchConfig {
    pub fn from_map(map: &ConfigMap) -> Result<Self, ValidationError> {
        let launch = Fields::new(map, LAUNCH);
        let settings = Fields::new(map, CONFIG);

        let (key, raw) = launch
            .first_of(&["AppEXEPath", "AppCommandLine"])
            .ok_or(ValidationError::MissingRequiredField {
                section: LAUNCH,
                key: "AppEXEPath",
            })?;
        let command_path = launch.executable(key, raw)?;

        let extra_args = launch.optional("AppCommandLineArgs");
        let command_args = if launch.has_prefix("NAV_") {
            let nav = NavisionArgs::from_fields(&launch)?.render();
            Some(match extra_args {
                Some(extra) => format!("{nav} {extra}"),
                None => nav,
            })
        } else {
            extra_args.map(str::to_string)
        };

        Ok(Self {
            command_path,
            command_args,
            wait_for_logon_process: logon_process(&settings)?,
            run_first: run_first(&launch, &settings)?,
            import_registry_file: registry_file(&launch)?,
            presentation: presentation(&settings),
            wait_policy: wait_policy(&settings)?,
            splash_dwell: settings
                .number("SplashMinimumSeconds")?
                .map_or(DEFAULT_SPLASH_DWELL, Duration::from_secs),
        })
    }

    pub fn main_program(&self) -> ProgramSpec {
        ProgramSpec {
            path: self.command_path.clone(),
            args: self.command_args.clone(),
        }
    }
}

fn logon_process(settings: &Fields<'_>) -> Result<Option<String>, ValidationError> {
    let name = settings
        .first_of(&["WaitForProcess", "WaitForLogonProcess"])
        .map(|(_, name)| name)
        .filter(|name| *name != SENTINEL);

    let name = match settings.flag("WaitForLogonScript")? {
        Some(true) => Some(name.ok_or(ValidationError::OptionalGroupIncomplete {
            section: CONFIG,
            key: "WaitForLogonScript",
            missing: "WaitForProcess",
        })?),
        Some(false) => None,
        None => name,
    };
    Ok(name.map(str::to_string))
}

fn run_first(
    launch: &Fields<'_>,
    settings: &Fields<'_>,
) -> Result<Option<RunFirst>, ValidationError> {
    if !launch.flag("AppRunFirst")?.unwrap_or(false) {
        return Ok(None);
    }
    let raw = launch
        .optional("AppRunFirstEXE")
        .ok_or(ValidationError::OptionalGroupIncomplete {
            section: LAUNCH,
            key: "AppRunFirst",
            missing: "AppRunFirstEXE",
        })?;

    Ok(Some(RunFirst {
        exe_path: launch.executable("AppRunFirstEXE", raw)?,
        args: launch
            .optional("AppRunFirstCommandLineArgs")
            .map(str::to_string),
        wait_for_exit: settings.flag("WaitForAppRunFirstEXE")?.unwrap_or(false),
    }))
}

fn registry_file(launch: &Fields<'_>) -> Result<Option<PathBuf>, ValidationError> {
    for (switch, file) in [
        ("AppImportRegFile", "AppRegFile"),
        ("NAV_ImportRegFile", "NAV_RegFile"),
    ] {
        if !launch.flag(switch)?.unwrap_or(false) {
            continue;
        }
        let raw = launch
            .optional(file)
            .ok_or(ValidationError::OptionalGroupIncomplete {
                section: LAUNCH,
                key: switch,
                missing: file,
            })?;
        return launch.existing_file(file, raw).map(Some);
    }
    Ok(None)
}

fn presentation(settings: &Fields<'_>) -> Presentation {
    let defaults = Presentation::default();
    Presentation {
        title_text: settings.text_or("TitleLabel", defaults.title_text),
        loading_text: settings.text_or("LoadingLabel", defaults.loading_text),
        title_color: settings.text_or("TitleForeground", defaults.title_color),
        loading_color: settings.text_or("LoadingForeground", defaults.loading_color),
        background_color: settings.text_or("BackgroundColor", defaults.background_color),
    }
}

fn wait_policy(settings: &Fields<'_>) -> Result<WaitPolicy, ValidationError> {
    let poll_interval = match settings.number("PollIntervalMilliseconds")? {
        Some(0) => {
            return Err(ValidationError::InvalidValue {
                section: CONFIG,
                key: "PollIntervalMilliseconds",
                value: "0".to_string(),
                expected: "a positive number of milliseconds",
            });
        }
        Some(ms) => Duration::from_millis(ms),
        None => DEFAULT_POLL_INTERVAL,
    };
    let timeout = settings
        .number("WaitTimeoutSeconds")?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    Ok(WaitPolicy {
        poll_interval,
        timeout,
    })
}

/// Typed reads of one section.
pub(crate) struct Fields<'a> {
    map: &'a ConfigMap,
    section: &'static str,
}

impl<'a> Fields<'a> {
    pub fn new(map: &'a ConfigMap, section: &'static str) -> Self {
        Self { map, section }
    }

    pub fn section(&self) -> &'static str {
        self.section
    }

    /// Blank values count as absent.
    fn raw(&self, key: &str) -> Option<&'a str> {
        self.map
            .get(self.section, key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.map
            .section(self.section)
            .is_some_and(|section| section.has_key_with_prefix(prefix))
    }

    pub fn first_of(&self, keys: &[&'static str]) -> Option<(&'static str, &'a str)> {
        keys.iter()
            .find_map(|key| self.raw(key).map(|value| (*key, value)))
    }

    pub fn optional(&self, key: &str) -> Option<&'a str> {
        self.raw(key).filter(|value| *value != SENTINEL)
    }

    pub fn required(&self, key: &'static str) -> Result<&'a str, ValidationError> {
        self.raw(key).ok_or(ValidationError::MissingRequiredField {
            section: self.section,
            key,
        })
    }

    pub fn text_or(&self, key: &str, default: String) -> String {
        self.raw(key).map_or(default, str::to_string)
    }

    pub fn flag(&self, key: &'static str) -> Result<Option<bool>, ValidationError> {
        let Some(value) = self.raw(key) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(self.invalid(key, value, "0 or 1")),
        }
    }

    pub fn number(&self, key: &'static str) -> Result<Option<u64>, ValidationError> {
        self.raw(key)
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|_| self.invalid(key, value, "a whole number"))
            })
            .transpose()
    }

    pub fn executable(&self, key: &'static str, value: &str) -> Result<PathBuf, ValidationError> {
        launcher::resolve_command(value).ok_or_else(|| self.not_found(key, value))
    }

    pub fn existing_file(&self, key: &'static str, value: &str) -> Result<PathBuf, ValidationError> {
        let path = Path::new(value);
        if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(self.not_found(key, value))
        }
    }

    fn not_found(&self, key: &'static str, value: &str) -> ValidationError {
        ValidationError::ReferencedPathNotFound {
            section: self.section,
            key,
            path: value.to_string(),
        }
    }

    fn invalid(&self, key: &'static str, value: &str, expected: &'static str) -> ValidationError {
        ValidationError::InvalidValue {
            section: self.section,
            key,
            value: value.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_ini;
    use crate::launcher::fake_executable;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        app: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let app = fake_executable(dir.path(), "app.exe");
            Self { dir, app }
        }

        fn validate(&self, extra_launch: &str, config: &str) -> Result<LaunchConfig, ValidationError> {
            let ini = format!(
                "[LAUNCH]\nAppEXEPath={}\n{extra_launch}\n[CONFIG]\n{config}\n",
                self.app.display()
            );
            LaunchConfig::from_map(&parse_ini(&ini))
        }
    }

    #[test]
    fn minimal_launch_section() {
        let fx = Fixture::new();
        let ini = format!("[LAUNCH]\nAppEXEPath={}\nAppCommandLineArgs=0\n", fx.app.display());
        let cfg = LaunchConfig::from_map(&parse_ini(&ini)).unwrap();
        assert_eq!(cfg.command_path, fx.app);
        assert_eq!(cfg.command_args, None);
        assert_eq!(cfg.wait_for_logon_process, None);
        assert_eq!(cfg.run_first, None);
        assert_eq!(cfg.import_registry_file, None);
        assert_eq!(cfg.presentation, Presentation::default());
        assert_eq!(cfg.wait_policy, WaitPolicy::default());
        assert_eq!(cfg.splash_dwell, DEFAULT_SPLASH_DWELL);
    }

    #[test]
    fn command_path_is_required() {
        let err = LaunchConfig::from_map(&parse_ini("[LAUNCH]\nAppCommandLineArgs=-x\n")).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingRequiredField {
                section: LAUNCH,
                key: "AppEXEPath"
            }
        );
        let err = LaunchConfig::from_map(&parse_ini("")).unwrap_err();
        assert!(matches!(err, ValidationError::MissingRequiredField { .. }));
    }

    #[test]
    fn app_command_line_is_an_alias() {
        let fx = Fixture::new();
        let ini = format!("[LAUNCH]\nAppCommandLine={}\n", fx.app.display());
        let cfg = LaunchConfig::from_map(&parse_ini(&ini)).unwrap();
        assert_eq!(cfg.command_path, fx.app);
    }

    #[test]
    fn command_path_must_exist() {
        let fx = Fixture::new();
        let missing = fx.dir.path().join("gone.exe");
        let ini = format!("[LAUNCH]\nAppEXEPath={}\n", missing.display());
        let err = LaunchConfig::from_map(&parse_ini(&ini)).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ReferencedPathNotFound { key: "AppEXEPath", .. }
        ));
    }

    #[rstest]
    #[case("AppCommandLineArgs=0", None)]
    #[case("AppCommandLineArgs=", None)]
    #[case("AppCommandLineArgs=/safe -profile \"a b\"", Some("/safe -profile \"a b\""))]
    fn arguments_are_verbatim_unless_sentinel(#[case] line: &str, #[case] expected: Option<&str>) {
        let fx = Fixture::new();
        let cfg = fx.validate(line, "").unwrap();
        assert_eq!(cfg.command_args.as_deref(), expected);
        assert_eq!(cfg.main_program().args.as_deref(), expected);
    }

    #[test]
    fn navision_keys_synthesize_arguments() {
        let fx = Fixture::new();
        let cfg = fx
            .validate(
                "NAV_ServerName=SQL01\nNAV_Database=Prod\nNAV_ZUPPath=fin.zup\nNAV_Company=0\nAppCommandLineArgs=-debug",
                "",
            )
            .unwrap();
        assert_eq!(
            cfg.command_args.as_deref(),
            Some("servername=SQL01,database=Prod,zup=fin.zup -debug")
        );
    }

    #[test]
    fn navision_mode_requires_server() {
        let fx = Fixture::new();
        let err = fx.validate("NAV_Database=Prod\nNAV_ZUPPath=fin.zup", "").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MissingRequiredField { key: "NAV_ServerName", .. }
        ));
    }

    #[rstest]
    #[case("", None)]
    #[case("WaitForProcess=wscript.exe", Some("wscript.exe"))]
    #[case("WaitForLogonProcess=cscript", Some("cscript"))]
    #[case("WaitForLogonScript=1\nWaitForProcess=wscript", Some("wscript"))]
    #[case("WaitForLogonScript=0\nWaitForProcess=wscript", None)]
    #[case("WaitForProcess=0", None)]
    fn logon_gate(#[case] config: &str, #[case] expected: Option<&str>) {
        let fx = Fixture::new();
        let cfg = fx.validate("", config).unwrap();
        assert_eq!(cfg.wait_for_logon_process.as_deref(), expected);
    }

    #[test]
    fn logon_gate_without_name_is_incomplete() {
        let fx = Fixture::new();
        let err = fx.validate("", "WaitForLogonScript=1").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OptionalGroupIncomplete { key: "WaitForLogonScript", .. }
        ));
    }

    #[test]
    fn run_first_group() {
        let fx = Fixture::new();
        let setup = fake_executable(fx.dir.path(), "setup.exe");
        let launch = format!(
            "AppRunFirst=1\nAppRunFirstEXE={}\nAppRunFirstCommandLineArgs=/quiet",
            setup.display()
        );
        let cfg = fx.validate(&launch, "WaitForAppRunFirstEXE=1").unwrap();
        assert_eq!(
            cfg.run_first,
            Some(RunFirst {
                exe_path: setup.clone(),
                args: Some("/quiet".to_string()),
                wait_for_exit: true,
            })
        );

        let cfg = fx.validate(&format!("AppRunFirst=0\nAppRunFirstEXE={}", setup.display()), "").unwrap();
        assert_eq!(cfg.run_first, None);
    }

    #[test]
    fn run_first_errors() {
        let fx = Fixture::new();
        let err = fx.validate("AppRunFirst=1", "").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OptionalGroupIncomplete { missing: "AppRunFirstEXE", .. }
        ));

        let missing = fx.dir.path().join("setup.exe");
        let err = fx
            .validate(&format!("AppRunFirst=1\nAppRunFirstEXE={}", missing.display()), "")
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::ReferencedPathNotFound { key: "AppRunFirstEXE", .. }
        ));
    }

    #[test]
    fn registry_import_pairs() {
        let fx = Fixture::new();
        let reg = fx.dir.path().join("settings.reg");
        fs::write(&reg, "Windows Registry Editor Version 5.00").unwrap();

        let cfg = fx.validate(&format!("AppImportRegFile=0\nAppRegFile={}", reg.display()), "").unwrap();
        assert_eq!(cfg.import_registry_file, None);
        let cfg = fx.validate(&format!("AppRegFile={}", reg.display()), "").unwrap();
        assert_eq!(cfg.import_registry_file, None);

        let cfg = fx.validate(&format!("AppImportRegFile=1\nAppRegFile={}", reg.display()), "").unwrap();
        assert_eq!(cfg.import_registry_file, Some(reg.clone()));

        let err = fx.validate("AppImportRegFile=1", "").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OptionalGroupIncomplete { missing: "AppRegFile", .. }
        ));

        let gone = fx.dir.path().join("gone.reg");
        let err = fx
            .validate(&format!("AppImportRegFile=1\nAppRegFile={}", gone.display()), "")
            .unwrap_err();
        assert!(matches!(err, ValidationError::ReferencedPathNotFound { .. }));
    }

    #[test]
    fn navision_registry_alias() {
        let fx = Fixture::new();
        let reg = fx.dir.path().join("nav.reg");
        fs::write(&reg, "x").unwrap();
        let launch = format!(
            "NAV_ServerName=S\nNAV_Database=D\nNAV_ZUPPath=z\nNAV_ImportRegFile=1\nNAV_RegFile={}",
            reg.display()
        );
        let cfg = fx.validate(&launch, "").unwrap();
        assert_eq!(cfg.import_registry_file, Some(reg));
    }

    #[rstest]
    #[case("NAV_ImportRegFile=0\n")]
    #[case("")]
    fn navision_registry_file_needs_the_switch(#[case] switch: &str) {
        let fx = Fixture::new();
        let reg = fx.dir.path().join("nav.reg");
        fs::write(&reg, "x").unwrap();
        let launch = format!(
            "NAV_ServerName=S\nNAV_Database=D\nNAV_ZUPPath=z\n{switch}NAV_RegFile={}",
            reg.display()
        );
        let cfg = fx.validate(&launch, "").unwrap();
        assert_eq!(cfg.import_registry_file, None);

        // Without the switch the file is not even checked for existence.
        let missing = format!(
            "NAV_ServerName=S\nNAV_Database=D\nNAV_ZUPPath=z\n{switch}NAV_RegFile={}",
            fx.dir.path().join("absent.reg").display()
        );
        assert_eq!(fx.validate(&missing, "").unwrap().import_registry_file, None);
    }

    #[test]
    fn presentation_overrides() {
        let fx = Fixture::new();
        let cfg = fx
            .validate("", "TitleLabel=Payroll\nLoadingForeground=Yellow\nBackgroundColor=#FF102030")
            .unwrap();
        assert_eq!(cfg.presentation.title_text, "Payroll");
        assert_eq!(cfg.presentation.loading_color, "Yellow");
        assert_eq!(cfg.presentation.background_color, "#FF102030");
        assert_eq!(cfg.presentation.loading_text, Presentation::default().loading_text);
    }

    #[test]
    fn wait_bounds() {
        let fx = Fixture::new();
        let cfg = fx
            .validate("", "WaitTimeoutSeconds=90\nPollIntervalMilliseconds=250\nSplashMinimumSeconds=0")
            .unwrap();
        assert_eq!(
            cfg.wait_policy,
            WaitPolicy {
                poll_interval: Duration::from_millis(250),
                timeout: Some(Duration::from_secs(90)),
            }
        );
        assert_eq!(cfg.splash_dwell, Duration::ZERO);

        let cfg = fx.validate("", "WaitTimeoutSeconds=0").unwrap();
        assert_eq!(cfg.wait_policy.timeout, None);
    }

    #[rstest]
    #[case("", "WaitTimeoutSeconds=soon")]
    #[case("", "PollIntervalMilliseconds=0")]
    #[case("", "WaitForLogonScript=maybe")]
    #[case("AppRunFirst=2", "")]
    fn invalid_values(#[case] launch: &str, #[case] config: &str) {
        let fx = Fixture::new();
        let err = fx.validate(launch, config).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }), "{err:?}");
    }

    #[test]
    fn errors_name_the_offending_key() {
        let err = ValidationError::OptionalGroupIncomplete {
            section: LAUNCH,
            key: "AppRunFirst",
            missing: "AppRunFirstEXE",
        };
        assert_eq!(
            err.to_string(),
            "[LAUNCH] AppRunFirst is enabled but AppRunFirstEXE is not set"
        );
    }
}
