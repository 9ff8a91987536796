//! Command implementations: thin veneers over the bridge API.

use colored::Colorize;
use pybridge::{Python, PythonError, ToPython};

/// Print the resolved interpreter's identity.
pub fn info() -> Result<(), String> {
    let python = try_python()?;
    println!("{} {}", "version:".bold(), python.version());
    println!(
        "{} {}",
        "library:".bold(),
        python
            .library_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<current process image>".to_string())
    );
    println!(
        "{} {}",
        "symbols:".bold(),
        if python.is_legacy() { "legacy" } else { "modern" }
    );
    Ok(())
}

/// Run a source snippet through the interpreter.
pub fn run(code: &str) -> Result<(), String> {
    let python = try_python()?;
    python.run(code).map_err(render_error)
}

/// Evaluate an expression with the `eval` builtin and print its repr.
pub fn eval(expression: &str) -> Result<(), String> {
    let python = try_python()?;
    let result = python
        .get("eval")
        .try_call(&[expression.to_python()])
        .map_err(render_error)?;
    println!("{}", result.try_repr().map_err(render_error)?);
    Ok(())
}

/// Import a module and print its repr.
pub fn import(module: &str) -> Result<(), String> {
    let python = try_python()?;
    let imported = python.attempt_import(module).map_err(render_error)?;
    println!("{}", imported.try_repr().map_err(render_error)?);
    Ok(())
}

fn try_python() -> Result<&'static Python, String> {
    Python::try_shared().map_err(|error| error.to_string())
}

fn render_error(error: PythonError) -> String {
    match &error {
        PythonError::Exception { traceback, .. } => {
            log::debug!("guest traceback present: {}", traceback.is_some());
            error.to_string()
        }
        _ => error.to_string(),
    }
}
