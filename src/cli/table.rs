use std::marker::PhantomData;

use prettytable::{format, Row, Table};

pub trait ToRow {
    fn columns() -> Row;
    fn to_row(&self) -> Row;
}

/// Rows of a single type under a one-line title separator
pub struct OutputTable<T: ToRow> {
    inner: Table,
    row_type: PhantomData<T>,
}

impl<T: ToRow> OutputTable<T> {
    pub fn new() -> Self {
        let format = format::FormatBuilder::new()
            .padding(1, 1)
            .separator(
                format::LinePosition::Title,
                format::LineSeparator::new('-', '+', '+', '+'),
            )
            .build();
        let mut inner = Table::new();
        inner.set_format(format);
        inner.set_titles(T::columns());
        Self {
            inner,
            row_type: PhantomData,
        }
    }

    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut table = Self::new();
        for row in rows {
            table.inner.add_row(row.to_row());
        }
        table
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Prints nothing at all when there are no rows, not even the titles
    pub fn print(&self) {
        if !self.is_empty() {
            self.inner.printstd();
        }
    }

    #[cfg(test)]
    fn render(&self) -> String {
        self.inner.to_string()
    }
}
