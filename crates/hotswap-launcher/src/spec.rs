use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Whose identity a launched process runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityMode {
    /// Same identity and working directory as the current process.
    #[default]
    Inherited,
    /// Through the platform's elevation prompt.
    Elevated,
    /// As the user logged in to the interactive desktop, even when the
    /// current process is elevated.
    InteractiveUser,
}

impl IdentityMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inherited => "inherited",
            Self::Elevated => "admin",
            Self::InteractiveUser => "user",
        }
    }
}

impl FromStr for IdentityMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "admin" | "elevated" => Ok(Self::Elevated),
            "user" | "interactive" => Ok(Self::InteractiveUser),
            "inherited" | "inherit" => Ok(Self::Inherited),
            other => Err(format!("unknown launch mode '{other}' (expected admin or user)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable_path: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub identity_mode: IdentityMode,
    pub arguments: Vec<String>,
}

impl LaunchSpec {
    pub fn new(executable_path: impl Into<PathBuf>) -> Self {
        Self {
            executable_path: executable_path.into(),
            working_dir: None,
            identity_mode: IdentityMode::Inherited,
            arguments: Vec::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_identity(mut self, mode: IdentityMode) -> Self {
        self.identity_mode = mode;
        self
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    /// Working directory to use: the explicit one, else the executable's
    /// parent directory.
    pub fn effective_working_dir(&self) -> Option<&Path> {
        self.working_dir
            .as_deref()
            .or_else(|| self.executable_path.parent())
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Arguments joined into a single Windows command-line tail.
    pub fn command_line_tail(&self) -> String {
        self.arguments
            .iter()
            .map(|arg| quote_argument(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Quotes an argument for a Windows command line when it contains
/// whitespace or quotes, escaping embedded quotes and the backslashes that
/// precede them.
pub fn quote_argument(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"') {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}
