use colored::*;
use prettytable::{row, Row};

use super::table::ToRow;
use super::DiffRow;
use crate::snapshot::Change;
use crate::utils::maybe_string;

impl ToRow for DiffRow {
    fn columns() -> Row {
        row!["Change", "Key", "Meaning", "Rule", "Old Value", "New Value"]
    }

    fn to_row(&self) -> Row {
        let change = match self.change {
            Change::Added => self.change.to_string().green(),
            Change::Updated => self.change.to_string().yellow(),
            Change::Removed => self.change.to_string().red(),
        };
        // Restart-only changes stand out
        let meaning = if self.interpretation.requires_restart() {
            format!("{} (restart)", self.interpretation).red().bold()
        } else {
            self.interpretation.to_string().normal()
        };
        row![
            change.to_string(),
            self.key,
            meaning.to_string(),
            maybe_string(self.rule.as_ref()),
            maybe_string(self.old.as_ref()),
            maybe_string(self.new.as_ref()),
        ]
    }
}
