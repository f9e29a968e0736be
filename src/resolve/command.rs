//! Mapping from entry-file extensions to concrete shell invocations.
//!
//! A static table maps each lowercase extension to a command template.
//! Interpreted languages get a single-step invocation; compiled languages
//! get a compile-then-execute pipeline joined with `&&`, so a failed
//! compile never executes a stale or missing binary.

use std::path::Path;

use tracing::debug;

use crate::error::RequestError;

/// How an extension's command line is built.
enum Template {
    /// `<prefix> "<file>"`, e.g. `python3 "main.py"` or `go run "main.go"`.
    Interpreter(&'static str),
    /// `<compiler> "<file>" -o "<bin>" && "<bin>"`.
    CompileAndRun(&'static str),
}

/// The extension table. Lookup is by lowercase extension.
const RUN_COMMANDS: &[(&str, Template)] = &[
    ("py", Template::Interpreter("python3")),
    ("js", Template::Interpreter("node")),
    ("mjs", Template::Interpreter("node")),
    ("ts", Template::Interpreter("npx ts-node")),
    ("sh", Template::Interpreter("sh")),
    ("bash", Template::Interpreter("bash")),
    ("rb", Template::Interpreter("ruby")),
    ("php", Template::Interpreter("php")),
    ("pl", Template::Interpreter("perl")),
    ("lua", Template::Interpreter("lua")),
    ("go", Template::Interpreter("go run")),
    // Single-file source launch (JEP 330), no separate compile step.
    ("java", Template::Interpreter("java")),
    ("rs", Template::CompileAndRun("rustc")),
    ("c", Template::CompileAndRun("cc")),
    ("cpp", Template::CompileAndRun("c++")),
    ("cc", Template::CompileAndRun("c++")),
    ("cxx", Template::CompileAndRun("c++")),
];

/// A concrete shell invocation for an entry file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    /// The full command line, executed via `sh -c`.
    pub shell: String,
}

impl std::fmt::Display for RunCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.shell)
    }
}

/// Builds the shell invocation for the given entry file.
///
/// # Errors
///
/// Returns [`RequestError::UnsupportedExtension`] when the extension has no
/// entry in the table. The caller surfaces this as a request error, not an
/// execution failure.
pub fn command_for(file: &Path) -> Result<RunCommand, RequestError> {
    let extension = file
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let template = RUN_COMMANDS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, t)| t)
        .ok_or(RequestError::UnsupportedExtension {
            extension: extension.clone(),
        })?;

    let path = file.display();
    let shell = match template {
        Template::Interpreter(prefix) => format!("{prefix} \"{path}\""),
        Template::CompileAndRun(compiler) => {
            let binary = compiled_binary_path(file);
            format!("{compiler} \"{path}\" -o \"{binary}\" && \"{binary}\"")
        }
    };

    debug!(%extension, %shell, "Resolved run command");
    Ok(RunCommand { shell })
}

/// Destination for a compiled temp binary, next to the source file.
fn compiled_binary_path(file: &Path) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("out"));
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!(".{stem}.bin")).display().to_string()
}

/// Lists the extensions the table supports, for diagnostics.
#[must_use]
pub fn supported_extensions() -> Vec<&'static str> {
    RUN_COMMANDS.iter().map(|(ext, _)| *ext).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_interpreter_command() {
        let cmd = command_for(&PathBuf::from("/ws/a.py")).expect("python command");
        assert_eq!(cmd.shell, "python3 \"/ws/a.py\"");
    }

    #[test]
    fn test_extension_case_insensitive() {
        let cmd = command_for(&PathBuf::from("/ws/Main.PY")).expect("python command");
        assert_eq!(cmd.shell, "python3 \"/ws/Main.PY\"");
    }

    #[test]
    fn test_multi_word_interpreter_prefix() {
        let cmd = command_for(&PathBuf::from("/ws/main.go")).expect("go command");
        assert_eq!(cmd.shell, "go run \"/ws/main.go\"");
    }

    #[test]
    fn test_compile_then_run_pipeline() {
        let cmd = command_for(&PathBuf::from("/ws/main.c")).expect("c command");
        assert_eq!(
            cmd.shell,
            "cc \"/ws/main.c\" -o \"/ws/.main.bin\" && \"/ws/.main.bin\""
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let err = command_for(&PathBuf::from("/ws/data.csv")).unwrap_err();
        assert!(matches!(
            err,
            RequestError::UnsupportedExtension { extension } if extension == "csv"
        ));
    }

    #[test]
    fn test_missing_extension_is_unsupported() {
        let err = command_for(&PathBuf::from("/ws/Makefile")).unwrap_err();
        assert!(matches!(err, RequestError::UnsupportedExtension { .. }));
    }

    #[test]
    fn test_supported_extensions_nonempty() {
        let exts = supported_extensions();
        assert!(exts.contains(&"py"));
        assert!(exts.contains(&"rs"));
    }
}
