use anyhow::bail;
use owo_colors::OwoColorize;
use std::process::Command;

const INSTALL_SCRIPT: &str =
    "curl -sL https://raw.githubusercontent.com/teamcutter/chatr/main/install.sh | sh";

pub fn run() -> anyhow::Result<()> {
    let spinner = chatr::progress::spinner("Updating chatr...".to_string());
    let status = Command::new("sh").arg("-c").arg(INSTALL_SCRIPT).status();
    spinner.finish_and_clear();

    println!();
    match status {
        Ok(status) if status.success() => {
            println!(
                "{} chatr updated to version {}{}{}{}{}",
                "✓".green(),
                env!("CARGO_PKG_VERSION").bold(),
                "-".bold(),
                std::env::consts::OS.bold(),
                "/".bold(),
                std::env::consts::ARCH.bold()
            );
            Ok(())
        }
        _ => {
            println!("{} failed to update chatr", "✗".red());
            bail!("self-update failed");
        }
    }
}
