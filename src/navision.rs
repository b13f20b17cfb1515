//! Command line synthesis for the Navision client (`NAV_*` keys).
//!
//! The client takes a single comma-separated list of `key=value` segments:
//!
//! ```text
//! servername=SQL01,database=Prod,ntauthentication=yes,company="My Co",zup=C:\u\fin.zup
//! ```

use std::borrow::Cow;
use std::env;

use crate::launch_config::{Fields, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavisionArgs {
    pub server_name: String,
    pub database: String,
    pub zup_path: String,
    pub nt_authentication: bool,
    pub company: Option<String>,
    pub temp_path: Option<String>,
    pub region: Option<String>,
}

impl NavisionArgs {
    pub(crate) fn from_fields(launch: &Fields<'_>) -> Result<Self, ValidationError> {
        let server_name = launch.required("NAV_ServerName")?.to_string();
        let database = launch.required("NAV_Database")?.to_string();

        let zup_path = if launch.flag("NAV_UseGenericZUP")?.unwrap_or(false) {
            let raw = launch.optional("NAV_GenericZUP").ok_or(
                ValidationError::OptionalGroupIncomplete {
                    section: launch.section(),
                    key: "NAV_UseGenericZUP",
                    missing: "NAV_GenericZUP",
                },
            )?;
            let generic = launch.existing_file("NAV_GenericZUP", &expand_env(raw))?;
            generic.display().to_string()
        } else {
            expand_env(launch.required("NAV_ZUPPath")?)
        };

        let region = if launch.flag("NAV_SetRegion")?.unwrap_or(false) {
            let region = launch.optional("NAV_Region").ok_or(
                ValidationError::OptionalGroupIncomplete {
                    section: launch.section(),
                    key: "NAV_SetRegion",
                    missing: "NAV_Region",
                },
            )?;
            Some(region.to_string())
        } else {
            None
        };

        Ok(Self {
            server_name,
            database,
            zup_path,
            nt_authentication: launch.flag("NAV_NTAUT")?.unwrap_or(false),
            company: launch.optional("NAV_Company").map(str::to_string),
            temp_path: launch.optional("NAV_Temp").map(expand_env),
            region,
        })
    }

    pub fn segments(&self) -> Vec<String> {
        let mut segments = vec![
            segment("servername", &self.server_name),
            segment("database", &self.database),
        ];
        if self.nt_authentication {
            segments.push(segment("ntauthentication", "yes"));
        }
        if let Some(company) = &self.company {
            segments.push(segment("company", company));
        }
        segments.push(segment("zup", &self.zup_path));
        if let Some(temp) = &self.temp_path {
            segments.push(segment("temppath", temp));
        }
        if let Some(region) = &self.region {
            segments.push(segment("region", region));
        }
        segments
    }

    pub fn render(&self) -> String {
        self.segments().join(",")
    }
}

fn segment(key: &str, value: &str) -> String {
    format!("{key}={}", quote(value))
}

fn quote(value: &str) -> Cow<'_, str> {
    let already_quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
    if !already_quoted && value.contains([' ', ',']) {
        Cow::Owned(format!("\"{value}\""))
    } else {
        Cow::Borrowed(value)
    }
}

/// Replaces `%NAME%` with the environment variable `NAME`. Unknown
/// variables and stray `%` signs are kept verbatim.
pub fn expand_env(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match env::var(name) {
                    Ok(expanded) => out.push_str(&expanded),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
