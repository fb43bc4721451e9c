//! Output rendering and formatting

use apkm_install::service::InstalledPackage;
use apkm_types::{ColorChoice, PackageDescriptor, Phase};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use serde::Serialize;
use std::io;

/// Result of one CLI command
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CommandOutput {
    /// Contents of a bundle
    Package(PackageDescriptor),
    /// Outcome of an install run
    Install(InstallSummary),
    /// Installed packages
    Installed(Vec<InstalledPackage>),
    Message(String),
}

/// Final state of an install run
#[derive(Debug, Clone, Serialize)]
pub struct InstallSummary {
    pub package_id: String,
    pub display_name: String,
    pub version_name: String,
    pub outcome: Phase,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    /// Color configuration
    color_choice: ColorChoice,
    /// Terminal instance
    term: Term,
}

impl OutputRenderer {
    /// Create new output renderer
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    /// Render command result
    pub fn render_result(&self, result: &CommandOutput) -> io::Result<()> {
        if self.json_output {
            self.render_json(result)
        } else {
            self.render_table(result)
        }
    }

    /// Render as JSON
    fn render_json(&self, result: &CommandOutput) -> io::Result<()> {
        let json = serde_json::to_string_pretty(result).map_err(io::Error::other)?;
        self.term.write_line(&json)
    }

    /// Render as formatted table
    fn render_table(&self, result: &CommandOutput) -> io::Result<()> {
        match result {
            CommandOutput::Package(descriptor) => self.render_package(descriptor),
            CommandOutput::Install(summary) => self.render_install(summary),
            CommandOutput::Installed(packages) => self.render_installed(packages),
            CommandOutput::Message(message) => self.term.write_line(message),
        }
    }

    /// Describe a bundle before installing it
    pub fn render_package(&self, descriptor: &PackageDescriptor) -> io::Result<()> {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.add_row(vec![
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new(self.style_package_name(&descriptor.display_name)),
        ]);
        table.add_row(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new(&descriptor.package_id),
        ]);
        table.add_row(vec![
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new(format!(
                "{} ({})",
                descriptor.version_name, descriptor.version_code
            )),
        ]);
        table.add_row(vec![
            Cell::new("Payloads").add_attribute(Attribute::Bold),
            Cell::new(format!(
                "{} file(s), {}",
                descriptor.payload_count(),
                format_size(descriptor.total_size)
            )),
        ]);
        table.add_row(vec![
            Cell::new("Icon").add_attribute(Attribute::Bold),
            Cell::new(if descriptor.has_icon() { "yes" } else { "no" }),
        ]);
        if !descriptor.permissions.is_empty() {
            table.add_row(vec![
                Cell::new("Permissions").add_attribute(Attribute::Bold),
                Cell::new(descriptor.permissions.join("\n")),
            ]);
        }

        self.term.write_line(&table.to_string())
    }

    fn render_install(&self, summary: &InstallSummary) -> io::Result<()> {
        let seconds = summary.elapsed_ms as f64 / 1000.0;
        match &summary.outcome {
            Phase::Success { package_id } => {
                let line = format!(
                    "Installed {} {} ({package_id}) in {seconds:.1}s",
                    summary.display_name, summary.version_name
                );
                self.term.write_line(&self.paint(&line, Style::new().green().bold()))
            }
            Phase::Failure(failure) => {
                let line = format!(
                    "Install of {} failed [{}]: {}",
                    summary.package_id,
                    failure.reason.code(),
                    failure.message
                );
                self.term.write_line(&self.paint(&line, Style::new().red().bold()))
            }
            other => self
                .term
                .write_line(&format!("Install of {} ended in {other}", summary.package_id)),
        }
    }

    fn render_installed(&self, packages: &[InstalledPackage]) -> io::Result<()> {
        if packages.is_empty() {
            return self.term.write_line("No packages installed.");
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Splits").add_attribute(Attribute::Bold),
            Cell::new("Size").add_attribute(Attribute::Bold),
            Cell::new("Installed").add_attribute(Attribute::Bold),
        ]);

        for package in packages {
            let name = if self.supports_color() {
                Cell::new(&package.package_id).fg(Color::Cyan)
            } else {
                Cell::new(&package.package_id)
            };
            table.add_row(vec![
                name,
                Cell::new(format!("{} ({})", package.version_name, package.version_code)),
                Cell::new(package.splits.len()),
                Cell::new(format_size(package.total_size())),
                Cell::new(package.installed_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }

        self.term.write_line(&table.to_string())
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.supports_color() {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn style_package_name(&self, name: &str) -> String {
        self.paint(name, Style::new().bold())
    }

    /// Check if color output is supported
    fn supports_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }
}

/// Format byte size in human readable format
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{size:.0} {}", UNITS[unit_index])
    } else {
        format!("{size:.1} {}", UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn install_summary_serializes_outcome() {
        let output = CommandOutput::Install(InstallSummary {
            package_id: "com.example".into(),
            display_name: "Example".into(),
            version_name: "1.0".into(),
            outcome: Phase::success("com.example"),
            attempts: 1,
            elapsed_ms: 10,
        });
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "install");
        assert_eq!(json["data"]["outcome"]["phase"], "success");
    }
}
