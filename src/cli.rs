use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::core::ConfigOverrides;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "locdash",
    version,
    about = "Browse and edit the translation keys of a localization management API.",
    after_help = "Examples:\n  locdash projects\n  locdash keys web-app --search save --lang es\n  locdash set 1 es=Guardar fr=Enregistrer\n  locdash --demo remove-language web-app fr"
)]
pub struct Cli {
    /// Base URL of the localization API (defaults to http://localhost:8000)
    #[arg(long, value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Identity stamped on edits while they wait for the server
    #[arg(long, value_name = "NAME", global = true)]
    pub actor: Option<String>,

    /// Request timeout in seconds
    #[arg(long = "timeout", value_name = "SECONDS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Read settings from this TOML file instead of the platform config dir
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Work against built-in sample data instead of the API
    #[arg(long, global = true)]
    pub demo: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override the tracing filter (e.g. "info", "debug", or full directives)
    #[arg(long = "log", value_name = "DIRECTIVE", global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_url: self.api_url.clone(),
            actor: self.actor.clone(),
            timeout_secs: self.timeout_secs,
            config_path: self.config.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// List projects
    Projects,
    /// Show one project
    Project(ProjectIdArgs),
    /// List translation keys, optionally filtered
    Keys(KeysArgs),
    /// Show one translation key
    Key(KeyIdArgs),
    /// List the categories in use
    Categories(CategoriesArgs),
    /// Show translation completion per language
    Stats(ProjectIdArgs),
    /// Print the key/value table of one locale
    Localizations(LocalizationsArgs),
    /// Create a translation key
    AddKey(AddKeyArgs),
    /// Set translation values of a key
    Set(SetArgs),
    /// Delete one or more translation keys by id
    DeleteKey(DeleteKeyArgs),
    /// Add a supported language to a project
    AddLanguage(LanguageArgs),
    /// Remove a supported language and its translations from a project
    RemoveLanguage(LanguageArgs),
    /// Create a project
    CreateProject(CreateProjectArgs),
    /// Change project settings
    UpdateProject(UpdateProjectArgs),
    /// Delete a project and its keys
    DeleteProject(ProjectIdArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProjectIdArgs {
    #[arg(value_name = "PROJECT")]
    pub project: String,
}

#[derive(Args, Debug, Clone)]
pub struct KeyIdArgs {
    #[arg(value_name = "KEY_ID")]
    pub id: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct KeysArgs {
    /// Limit to one project (all projects when omitted)
    #[arg(value_name = "PROJECT")]
    pub project: Option<String>,

    /// Case-insensitive text matched against key, description and values
    #[arg(long)]
    pub search: Option<String>,

    /// Keep keys in these categories (comma-separated or repeated flag)
    #[arg(long, value_delimiter = ',', action = ArgAction::Append)]
    pub category: Vec<String>,

    /// Keep keys translated into any of these languages (comma-separated or repeated flag)
    #[arg(long = "lang", value_delimiter = ',', action = ArgAction::Append)]
    pub languages: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CategoriesArgs {
    #[arg(value_name = "PROJECT")]
    pub project: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LocalizationsArgs {
    #[arg(value_name = "PROJECT")]
    pub project: String,

    #[arg(value_name = "LOCALE")]
    pub locale: String,
}

#[derive(Args, Debug, Clone)]
pub struct AddKeyArgs {
    #[arg(value_name = "PROJECT")]
    pub project: String,

    /// Dotted identifier, e.g. button.save
    #[arg(value_name = "KEY")]
    pub key: String,

    #[arg(long)]
    pub category: String,

    #[arg(long)]
    pub description: Option<String>,

    /// Initial values as LANG=VALUE pairs
    #[arg(value_name = "LANG=VALUE", required = true, value_parser = parse_translation)]
    pub values: Vec<(String, String)>,
}

#[derive(Args, Debug, Clone)]
pub struct SetArgs {
    #[arg(value_name = "KEY_ID")]
    pub id: String,

    /// Values as LANG=VALUE pairs
    #[arg(value_name = "LANG=VALUE", required = true, value_parser = parse_translation)]
    pub values: Vec<(String, String)>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteKeyArgs {
    #[arg(value_name = "KEY_ID", required = true)]
    pub ids: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LanguageArgs {
    #[arg(value_name = "PROJECT")]
    pub project: String,

    #[arg(value_name = "CODE")]
    pub code: String,
}

#[derive(Args, Debug, Clone)]
pub struct CreateProjectArgs {
    #[arg(value_name = "NAME")]
    pub name: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long = "default-language", value_name = "CODE", default_value = "en")]
    pub default_language: String,

    /// Additional supported languages (comma-separated or repeated flag)
    #[arg(long = "lang", value_delimiter = ',', action = ArgAction::Append)]
    pub languages: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateProjectArgs {
    #[arg(value_name = "PROJECT")]
    pub project: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Replace the supported languages (comma-separated or repeated flag)
    #[arg(long = "lang", value_delimiter = ',', action = ArgAction::Append)]
    pub languages: Vec<String>,

    #[arg(long, value_name = "BOOL")]
    pub active: Option<bool>,
}

fn parse_translation(raw: &str) -> Result<(String, String), String> {
    let (language, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected LANG=VALUE, got '{raw}'"))?;
    let language = language.trim();
    if language.is_empty() {
        return Err(format!("missing language code in '{raw}'"));
    }
    Ok((language.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_translation_pairs() {
        assert_eq!(
            parse_translation("es=Guardar cambios"),
            Ok(("es".to_string(), "Guardar cambios".to_string()))
        );
        assert_eq!(
            parse_translation("en=a=b"),
            Ok(("en".to_string(), "a=b".to_string()))
        );
        assert!(parse_translation("Guardar").is_err());
        assert!(parse_translation(" =x").is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::parse_from([
            "locdash",
            "keys",
            "web-app",
            "--category",
            "buttons,forms",
            "--lang",
            "es",
            "--demo",
            "--json",
        ]);
        assert!(cli.demo);
        assert!(cli.json);
        let CliCommand::Keys(args) = cli.command else {
            panic!("expected keys command");
        };
        assert_eq!(args.project.as_deref(), Some("web-app"));
        assert_eq!(args.category, ["buttons", "forms"]);
        assert_eq!(args.languages, ["es"]);
    }

    #[test]
    fn overrides_carry_connection_flags() {
        let cli = Cli::parse_from([
            "locdash",
            "--api-url",
            "http://api.test",
            "--timeout",
            "3",
            "projects",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.api_url.as_deref(), Some("http://api.test"));
        assert_eq!(overrides.timeout_secs, Some(3));
        assert_eq!(overrides.actor, None);
    }
}
