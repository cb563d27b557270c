use super::EXIT_SUCCESS;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io::Write;

const BIN_NAME: &str = "gitenv";

/// Completion script for `shell`, written to `out`.
pub fn write_script<C: CommandFactory>(shell: Shell, out: &mut dyn Write) -> Result<(), String> {
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut C::command(), BIN_NAME, &mut buf);
    out.write_all(&buf)
        .and_then(|()| out.flush())
        .map_err(|e| format!("failed to write {shell} completions: {e}"))
}

pub fn run<C: CommandFactory>(shell: Shell) -> Result<u8, String> {
    write_script::<C>(shell, &mut std::io::stdout().lock())?;
    Ok(EXIT_SUCCESS)
}
