use crate::ConfigError;
use std::fmt;

/// Fixed set of language runtimes the sample projects cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    OutOfProc,
    Java,
    Node,
    Python,
    CSharp,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::OutOfProc => "outofproc",
            Language::Java => "java",
            Language::Node => "node",
            Language::Python => "python",
            Language::CSharp => "csharp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One registry row: the language, the port its function host listens on,
/// and where the runtime writes its log file inside the container.
#[derive(Debug, Clone, Copy)]
pub struct LanguageTarget {
    pub language: Language,
    pub port: u16,
}

const REGISTRY: [LanguageTarget; 5] = [
    LanguageTarget {
        language: Language::OutOfProc,
        port: 7101,
    },
    LanguageTarget {
        language: Language::Java,
        port: 7102,
    },
    LanguageTarget {
        language: Language::Node,
        port: 7103,
    },
    LanguageTarget {
        language: Language::Python,
        port: 7104,
    },
    LanguageTarget {
        language: Language::CSharp,
        port: 7105,
    },
];

pub fn supported_languages() -> impl Iterator<Item = &'static LanguageTarget> {
    REGISTRY.iter()
}

/// Maps a language identifier to its target. Unknown identifiers are a fatal
/// configuration error since port and compose selection depend on it.
pub fn resolve(language_id: &str) -> Result<LanguageTarget, ConfigError> {
    REGISTRY
        .iter()
        .find(|target| target.language.as_str() == language_id)
        .copied()
        .ok_or_else(|| ConfigError::UnsupportedLanguage {
            language: language_id.to_string(),
            accepted: REGISTRY
                .iter()
                .map(|target| target.language.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

impl LanguageTarget {
    /// Host-side sample directory name, e.g. `samples-node`.
    pub fn sample_dir_name(&self) -> String {
        format!("samples-{}", self.language)
    }

    /// In-container root the sample tree is copied to.
    pub fn container_sample_dir(&self) -> String {
        format!("/src/samples-{}/", self.language)
    }

    /// In-container path of the settings document the function host reads.
    pub fn container_settings_path(&self) -> String {
        format!("/src/samples-{}/local.settings.json", self.language)
    }

    /// In-container path of the runtime log file. The relative location
    /// differs per runtime flavor: the java host logs under its maven build
    /// output, the .NET flavors under their build output, everything else at
    /// the sample root.
    pub fn container_log_path(&self) -> String {
        match self.language {
            Language::Java => format!(
                "/src/samples-{}/target/azure-functions/kustojavafunctionssample-20230130111810292/func-logs.txt",
                self.language
            ),
            Language::OutOfProc | Language::CSharp => {
                format!("/src/samples-{}/bin/Debug/net6/func-logs.txt", self.language)
            }
            Language::Node | Language::Python => {
                format!("/src/samples-{}/func-logs.txt", self.language)
            }
        }
    }
}
