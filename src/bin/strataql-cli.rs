//! Interactive SQL shell over a `strataql` database. Reads statements
//! terminated by `;`, prints their result, and supports a handful of
//! dot-commands for quick catalog inspection.

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use strataql::{ColumnType, Database, DbConfig, QueryResult, Scalar, Session};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> strataql::Result<()> {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => interactive_mode(None),
        2 => match args[1].as_str() {
            "--version" | "-v" => {
                println!("strataql {VERSION}");
                Ok(())
            }
            "--help" | "-h" => {
                print_help();
                Ok(())
            }
            path => interactive_mode(Some(PathBuf::from(path))),
        },
        _ => {
            print_help();
            Err(strataql::Error::Validation("unexpected arguments".into()))
        }
    }
}

fn print_help() {
    println!(
        "strataql {VERSION}\n\n\
         usage:\n  \
         strataql-cli               open ./strataql_data and start a shell\n  \
         strataql-cli <path>        open or create a database at <path>\n  \
         strataql-cli --version\n  \
         strataql-cli --help"
    );
}

fn interactive_mode(db_path: Option<PathBuf>) -> strataql::Result<()> {
    let path = db_path.unwrap_or_else(|| PathBuf::from("./strataql_data"));
    println!("strataql {VERSION} — database: {}", path.display());
    println!("type '.help' for help, '.exit' to quit\n");

    let db = if path.exists() {
        Database::open(&path, DbConfig::default())?
    } else {
        println!("creating new database at {}", path.display());
        Database::create(&path, DbConfig::default())?
    };
    let session = Session::new();

    let stdin = io::stdin();
    let mut line = String::new();
    let mut pending = String::new();

    loop {
        print!("{}", if pending.is_empty() { "strataql> " } else { "      -> " });
        io::stdout().flush().ok();

        line.clear();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let input = line.trim();

        if pending.is_empty() && input.starts_with('.') {
            match input {
                ".exit" | ".quit" => break,
                ".help" => print_dot_help(),
                ".tables" => list_tables(&db),
                ".schema" => {
                    for name in db.table_names() {
                        show_schema(&db, &name);
                    }
                }
                cmd if cmd.starts_with(".schema ") => show_schema(&db, cmd[".schema ".len()..].trim()),
                _ => eprintln!("unknown command: {input}"),
            }
            continue;
        }

        if input.is_empty() {
            continue;
        }
        pending.push_str(input);
        pending.push(' ');

        if input.ends_with(';') {
            let sql = pending.trim_end_matches(';').trim().to_string();
            pending.clear();
            match db.execute(&session, &sql) {
                Ok(result) => display_result(result),
                Err(e) => eprintln!("error: {e}"),
            }
        }
    }
    Ok(())
}

fn print_dot_help() {
    println!(
        ".help              show this help\n\
         .exit, .quit       quit\n\
         .tables            list tables\n\
         .schema            show every table's schema\n\
         .schema <table>    show one table's schema"
    );
}

fn list_tables(db: &Database) {
    let names = db.table_names();
    if names.is_empty() {
        println!("no tables");
        return;
    }
    for name in names {
        println!("  {name}");
    }
}

fn show_schema(db: &Database, name: &str) {
    let Some(table) = db.table(name) else {
        eprintln!("no such table: {name}");
        return;
    };
    println!("table {name}");
    for col in &table.schema.columns {
        let ty = match col.ty {
            ColumnType::Int => "INT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Bool => "BOOL".to_string(),
            ColumnType::Vector(dim) => format!("VECTOR({dim})"),
        };
        let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
        println!("  {:<20} {:<12} {}", col.name, ty, nullable);
    }
}

fn display_result(result: QueryResult) {
    match result {
        QueryResult::Message(msg) => println!("{msg}"),
        QueryResult::RowsAffected(n) => println!("{n} row(s) affected"),
        QueryResult::Select { columns, rows } => display_table(&columns, &rows),
    }
}

fn display_table(columns: &[String], rows: &[Vec<Scalar>]) {
    if columns.is_empty() {
        println!("(no columns)");
        return;
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    let rendered: Vec<Vec<String>> = rows.iter().map(|row| row.iter().map(render_scalar).collect()).collect();
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.len());
            }
        }
    }

    print_rule(&widths, '┌', '┬', '┐');
    print_row(columns, &widths);
    print_rule(&widths, '├', '┼', '┤');
    for row in &rendered {
        print_row(row, &widths);
    }
    print_rule(&widths, '└', '┴', '┘');
    println!("{} row(s)", rows.len());
}

fn render_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Null => "NULL".to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => format!("{f:.4}"),
        Scalar::Text(s) => s.clone(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Vector(v) => format!("<vector[{}]>", v.len()),
    }
}

fn print_row(cells: &[impl AsRef<str>], widths: &[usize]) {
    print!("│");
    for (cell, width) in cells.iter().zip(widths) {
        print!(" {:width$} │", cell.as_ref(), width = width);
    }
    println!();
}

fn print_rule(widths: &[usize], left: char, mid: char, right: char) {
    print!("{left}");
    for (i, width) in widths.iter().enumerate() {
        print!("{}", "─".repeat(width + 2));
        print!("{}", if i + 1 == widths.len() { right } else { mid });
    }
    println!();
}
