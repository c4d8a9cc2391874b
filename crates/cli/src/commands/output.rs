//! Console rendering shared by the migration commands

use console::style;
use kest_migrate::{
    EventPublisher, MigrationDirection, MigrationEvent, MigrationEventKind, MigrationStatus,
    OutputWriter,
};

pub fn info(message: impl AsRef<str>) {
    println!("{} {}", style("INFO").cyan().bold(), message.as_ref());
}

pub fn success(message: impl AsRef<str>) {
    println!("{} {}", style("DONE").green().bold(), message.as_ref());
}

pub fn warning(message: impl AsRef<str>) {
    println!("{} {}", style("WARN").yellow().bold(), message.as_ref());
}

pub fn error(message: impl AsRef<str>) {
    eprintln!("{} {}", style("ERROR").red().bold().for_stderr(), message.as_ref());
}

/// Boxed banner printed before destructive operations
pub fn banner(message: &str) {
    let width = message.chars().count() + 4;
    let rule = "═".repeat(width);
    println!("{}", style(format!("╔{}╗", rule)).yellow());
    println!("{}", style(format!("║  {}  ║", message)).yellow().bold());
    println!("{}", style(format!("╚{}╝", rule)).yellow());
    println!();
}

/// Prints the statements a migration would run in pretend mode
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl OutputWriter for ConsoleOutput {
    fn write(&self, migration: &str, statements: &[String]) {
        println!("{}", pretend_block(migration, statements));
    }
}

fn pretend_block(migration: &str, statements: &[String]) -> String {
    let mut block = format!("{} {}", style("Migration:").cyan().bold(), migration);
    for sql in statements {
        for line in sql.lines() {
            block.push_str("\n    ");
            block.push_str(line.trim_end());
        }
    }
    block
}

/// Prints a progress line per migration as the engine works through them
#[derive(Debug, Default)]
pub struct ConsoleProgress;

impl EventPublisher for ConsoleProgress {
    fn publish(&self, event: MigrationEvent) {
        if let Some(line) = progress_line(&event) {
            println!("{}", line);
        }
    }
}

fn progress_line(event: &MigrationEvent) -> Option<String> {
    match &event.kind {
        MigrationEventKind::MigrationStarted { migration, method } => {
            let verb = match method {
                MigrationDirection::Up => "Migrating:",
                MigrationDirection::Down => "Rolling back:",
            };
            Some(format!("{} {}", style(verb).yellow(), migration))
        }
        MigrationEventKind::MigrationEnded { migration, method } => {
            let verb = match method {
                MigrationDirection::Up => "Migrated:",
                MigrationDirection::Down => "Rolled back:",
            };
            Some(format!("{} {}", style(verb).green(), migration))
        }
        MigrationEventKind::MigrationSkipped { migration } => {
            Some(format!("{} {}", style("Skipped:").dim(), migration))
        }
        _ => None,
    }
}

/// Plain text status table: migration, batch, status
pub fn status_table(statuses: &[MigrationStatus]) -> String {
    const HEADERS: [&str; 3] = ["Migration", "Batch", "Status"];

    let rows: Vec<[String; 3]> = statuses
        .iter()
        .map(|status| {
            [
                status.name.clone(),
                status
                    .batch
                    .map(|batch| batch.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                if status.ran { "Ran" } else { "Pending" }.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: [&str; 3]| {
        format!(
            "| {:<w0$} | {:<w1$} | {:<w2$} |",
            cells[0],
            cells[1],
            cells[2],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2]
        )
    };
    let separator = format!(
        "+{}+{}+{}+",
        "-".repeat(widths[0] + 2),
        "-".repeat(widths[1] + 2),
        "-".repeat(widths[2] + 2)
    );

    let mut table = vec![separator.clone(), format_row(HEADERS), separator.clone()];
    for row in &rows {
        table.push(format_row([&row[0], &row[1], &row[2]]));
    }
    table.push(separator);
    table.join("\n")
}
