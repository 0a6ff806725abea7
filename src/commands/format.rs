use super::query::{StatementOutcome, StatementOutput};
use crate::database::HydratedRow;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use std::time::Duration;

/// Text printed for one finished statement, starting with the statement echo.
pub fn render_outcome(outcome: &StatementOutcome) -> String {
    let mut out = format!("> {}\n", outcome.statement);
    let elapsed = seconds(outcome.elapsed);

    match &outcome.result {
        Ok(StatementOutput::Empty) => {
            out.push_str(&format!("Query OK, 0 rows affected ({})", elapsed));
        }
        Ok(StatementOutput::Message(message)) => out.push_str(message),
        Ok(StatementOutput::Notice(notice)) => out.push_str(&format!("Error: {}", notice)),
        Ok(StatementOutput::Records(rows)) if rows.is_empty() => {
            out.push_str(&format!("Empty set ({})", elapsed));
        }
        Ok(StatementOutput::Records(rows)) => {
            out.push_str(&render_rows(rows));
            out.push('\n');
            out.push_str(&format!(
                "{} {} in set ({})",
                rows.len(),
                plural(rows.len() as i64, "row"),
                elapsed
            ));
        }
        Ok(StatementOutput::Affected(count)) => {
            out.push_str(&format!(
                "Query OK, {} {} affected ({})",
                count,
                plural(*count, "row"),
                elapsed
            ));
        }
        Err(err) => out.push_str(&format!("ERROR: {}", err)),
    }

    out
}

fn render_rows(rows: &[HydratedRow]) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    if let Some(first) = rows.first() {
        let header_cells: Vec<Cell> = first
            .labels()
            .map(|label| Cell::new(label).add_attribute(Attribute::Bold))
            .collect();
        table.set_header(header_cells);
    }

    for row in rows {
        let cells: Vec<Cell> = row.values().map(Cell::new).collect();
        table.add_row(cells);
    }

    table.to_string()
}

fn seconds(elapsed: Duration) -> String {
    format!("{:.3} sec", elapsed.as_secs_f64())
}

fn plural(count: i64, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
