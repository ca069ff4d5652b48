use owo_colors::OwoColorize;

pub fn run() {
    println!(
        "{}{}{}{}{}{}{}",
        "chatr".bold(),
        "-".bold(),
        env!("CARGO_PKG_VERSION").bold(),
        "-".bold(),
        std::env::consts::OS.bold(),
        "/".bold(),
        std::env::consts::ARCH.bold()
    );
}
