use colored::*;

pub fn print_header(title: &str) {
    let line = "─".repeat(48);
    println!("{}", line.black().bold());

    let name = "marquee".yellow().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  {} {}  {}", name, version, title.cyan());

    println!("{}", line.black().bold());
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}

pub fn print_thinking(msg: &str) {
    println!("  {} {}...", "∴".magenta(), msg);
}

/// Show the device-flow instructions prominently
pub fn print_user_code(user_code: &str, verification_url: &str) {
    println!();
    println!("  Visit {}", verification_url.cyan().underline());
    println!("  and enter the code {}", user_code.yellow().bold());
    println!();
}
