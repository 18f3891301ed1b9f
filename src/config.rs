use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
const DEFAULT_BIND_PORT: u16 = 3001;

#[derive(Parser, Debug)]
#[command(name = "judge_server", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file, built-in defaults are used without it
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long = "bind", env = "COMPILER_BIND")]
    pub bind_address: Option<String>,

    /// Port to bind the HTTP server to
    #[arg(long = "port", short = 'p', env = "COMPILER_PORT")]
    pub bind_port: Option<u16>,

    /// Directory under which per-request workspaces are created
    #[arg(long = "workspace-root")]
    pub workspace_root: Option<PathBuf>,
}

impl CliArgs {
    /// Load the configuration file (if any) and apply command line overrides
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("Failed to open config file {}", path.display()))?;
                let reader = std::io::BufReader::new(file);
                serde_json::from_reader(reader)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Config::default(),
        };

        if let Some(address) = &self.bind_address {
            config.server.bind_address = Some(address.clone());
        }
        if let Some(port) = self.bind_port {
            config.server.bind_port = Some(port);
        }
        if let Some(root) = &self.workspace_root {
            config.judge.workspace_root = Some(root.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default = "default_languages")]
    pub languages: LanguageTable,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.judge.compile_timeout.0 == 0 || self.judge.run_timeout.0 == 0 {
            bail!("Timeouts must be greater than zero");
        }
        if self.judge.output_limit.0 == 0 {
            bail!("Output limit must be greater than zero");
        }
        if self.languages.is_empty() {
            bail!("At least one language must be configured");
        }

        let mut seen = HashSet::new();
        for language in self.languages.iter() {
            if language.name.is_empty() {
                bail!("Language name must not be empty");
            }
            if !seen.insert(language.name.as_str()) {
                bail!("Duplicate language {}", language.name);
            }
            if language.compile.is_empty() || language.run.is_empty() {
                bail!("Language {} needs both a compile and a run command", language.name);
            }
            if language.source_file.is_empty() || language.artifact.is_empty() {
                bail!("Language {} needs a source file and an artifact name", language.name);
            }
        }

        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

impl ServerConfig {
    pub fn address(&self) -> (String, u16) {
        (
            self.bind_address
                .clone()
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            self.bind_port.unwrap_or(DEFAULT_BIND_PORT),
        )
    }
}

/// Limits and locations shared by every compile and run
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct JudgeConfig {
    pub workspace_root: Option<PathBuf>,
    pub compile_timeout: MilliSecond,
    pub run_timeout: MilliSecond,
    pub output_limit: ByteSize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            compile_timeout: MilliSecond(10_000),
            run_timeout: MilliSecond(5_000),
            output_limit: ByteSize(1 << 20),
        }
    }
}

impl JudgeConfig {
    /// Resolves the workspace root, preferring the user cache directory
    pub fn workspace_root(&self) -> PathBuf {
        use directories::ProjectDirs;

        if let Some(root) = &self.workspace_root {
            return root.clone();
        }

        match ProjectDirs::from("", "", "judge_server") {
            Some(dirs) => dirs.cache_dir().join("workspaces"),
            None => std::env::temp_dir().join("judge_server-workspaces"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

impl From<MilliSecond> for Duration {
    fn from(value: MilliSecond) -> Self {
        Duration::from_millis(value.0)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_usize(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

/// One entry of the language table
///
/// Command templates may use `%INPUT%` (source path), `%OUTPUT%` (artifact
/// path) and `%DIR%` (workspace directory).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfig {
    pub name: String,
    pub source_file: String,
    pub artifact: String,
    pub compile: Vec<String>,
    pub run: Vec<String>,
    /// Whether the artifact is a native binary that needs the executable bit
    #[serde(default)]
    pub executable: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct LanguageTable(Vec<LanguageConfig>);

impl LanguageTable {
    pub fn new(languages: Vec<LanguageConfig>) -> Self {
        Self(languages)
    }

    pub fn find(&self, name: &str) -> Option<&LanguageConfig> {
        self.0.iter().find(|l| l.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LanguageConfig> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for LanguageTable {
    fn default() -> Self {
        default_languages()
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn default_languages() -> LanguageTable {
    LanguageTable(vec![
        LanguageConfig {
            name: "cpp".to_string(),
            source_file: "main.cpp".to_string(),
            artifact: "main".to_string(),
            compile: strings(&["g++", "-std=c++17", "-O2", "%INPUT%", "-o", "%OUTPUT%"]),
            run: strings(&["%OUTPUT%"]),
            executable: true,
        },
        LanguageConfig {
            // javac insists on the public class living in Main.java
            name: "java".to_string(),
            source_file: "Main.java".to_string(),
            artifact: "Main.class".to_string(),
            compile: strings(&["javac", "-d", "%DIR%", "%INPUT%"]),
            run: strings(&["java", "-cp", "%DIR%", "Main"]),
            executable: false,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.address(), ("127.0.0.1".to_string(), 3001));
        assert_eq!(config.judge.compile_timeout, MilliSecond(10_000));
        assert_eq!(config.judge.run_timeout, MilliSecond(5_000));
        assert_eq!(config.languages.names(), vec!["cpp", "java"]);
        assert!(config.languages.find("cpp").unwrap().executable);
        assert!(!config.languages.find("java").unwrap().executable);
    }

    #[test]
    fn test_config_deserialization() {
        let config: Config = serde_json::from_str(
            r#"{
                "server": { "bind_port": 8080 },
                "judge": { "run_timeout": 1500 },
                "languages": [
                    {
                        "name": "c",
                        "source_file": "main.c",
                        "artifact": "main",
                        "compile": ["gcc", "%INPUT%", "-o", "%OUTPUT%"],
                        "run": ["%OUTPUT%"],
                        "executable": true
                    }
                ]
            }"#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.server.address(), ("127.0.0.1".to_string(), 8080));
        assert_eq!(config.judge.run_timeout, MilliSecond(1500));
        assert_eq!(config.judge.compile_timeout, MilliSecond(10_000));
        assert_eq!(config.languages.names(), vec!["c"]);
        assert!(config.languages.find("cpp").is_none());
    }

    #[test]
    fn test_missing_languages_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.languages.names(), vec!["cpp", "java"]);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_zero_timeouts() {
        let mut config = Config::default();
        config.judge.run_timeout = MilliSecond(0);
        assert!(config.validate().is_err());

        let cpp = Config::default().languages.find("cpp").unwrap().clone();
        let config = Config {
            languages: LanguageTable::new(vec![cpp.clone(), cpp]),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = CliArgs::parse_from([
            "judge_server",
            "--port",
            "4000",
            "--workspace-root",
            "/tmp/ws",
        ]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.server.address().1, 4000);
        assert_eq!(config.judge.workspace_root(), PathBuf::from("/tmp/ws"));
    }
}
