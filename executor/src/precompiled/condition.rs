use tessera_common::state::{Entry, TableInfo};

/// Comparison operator of one condition term, as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompOp {
    Eq = 0,
    Ne = 1,
    Gt = 2,
    Ge = 3,
    Lt = 4,
    Le = 5,
}

impl TryFrom<u8> for CompOp {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompOp::Eq),
            1 => Ok(CompOp::Ne),
            2 => Ok(CompOp::Gt),
            3 => Ok(CompOp::Ge),
            4 => Ok(CompOp::Lt),
            5 => Ok(CompOp::Le),
            other => Err(other),
        }
    }
}

/// Numeric comparison when both sides parse as integers, byte order
/// otherwise.
fn compare(left: &str, right: &str) -> std::cmp::Ordering {
    match (left.parse::<i64>(), right.parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.cmp(right),
    }
}

#[derive(Debug, Clone)]
struct Term {
    field: String,
    op: CompOp,
    value: String,
}

/// Row filter for table selects: per-field comparison terms plus an
/// offset/limit window applied to the matching rows in key order.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    terms: Vec<Term>,
    offset: usize,
    limit: Option<usize>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, op: CompOp, value: impl Into<String>) {
        self.terms.push(Term {
            field: field.into(),
            op,
            value: value.into(),
        });
    }

    pub fn with_window(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = (limit > 0).then_some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// A term on the key field compares against the row key itself.
    pub fn matches(&self, info: &TableInfo, row_key: &str, entry: &Entry) -> bool {
        self.terms.iter().all(|term| {
            let actual = if term.field == info.key_field {
                row_key.to_string()
            } else {
                entry.field_utf8(&term.field)
            };
            let ordering = compare(&actual, &term.value);
            match term.op {
                CompOp::Eq => ordering.is_eq(),
                CompOp::Ne => ordering.is_ne(),
                CompOp::Gt => ordering.is_gt(),
                CompOp::Ge => ordering.is_ge(),
                CompOp::Lt => ordering.is_lt(),
                CompOp::Le => ordering.is_le(),
            }
        })
    }

    /// Apply the offset/limit window over rows that matched.
    pub fn window<T>(&self, rows: Vec<T>) -> Vec<T> {
        let iter = rows.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> TableInfo {
        TableInfo::new("t", "id", vec!["balance".into(), "name".into()])
    }

    fn entry(balance: &str, name: &str) -> Entry {
        Entry::from_fields([("balance", balance.to_string()), ("name", name.to_string())])
    }

    #[test]
    fn test_numeric_comparison_wins_over_lexicographic() {
        let mut condition = Condition::new();
        condition.push("balance", CompOp::Gt, "9");
        // "10" > "9" numerically even though it sorts lower as a string
        assert!(condition.matches(&info(), "k", &entry("10", "x")));
    }

    #[test]
    fn test_lexicographic_fallback() {
        let mut condition = Condition::new();
        condition.push("name", CompOp::Ge, "bob");
        assert!(condition.matches(&info(), "k", &entry("0", "carol")));
        assert!(!condition.matches(&info(), "k", &entry("0", "alice")));
    }

    #[test]
    fn test_key_field_term_targets_row_key() {
        let mut condition = Condition::new();
        condition.push("id", CompOp::Eq, "row-7");
        assert!(condition.matches(&info(), "row-7", &entry("0", "x")));
        assert!(!condition.matches(&info(), "row-8", &entry("0", "x")));
    }

    #[test]
    fn test_all_terms_must_match() {
        let mut condition = Condition::new();
        condition.push("balance", CompOp::Ge, "10");
        condition.push("balance", CompOp::Le, "20");
        assert!(condition.matches(&info(), "k", &entry("15", "x")));
        assert!(!condition.matches(&info(), "k", &entry("25", "x")));
    }

    #[test]
    fn test_window() {
        let condition = Condition::new().with_window(1, 2);
        assert_eq!(condition.window(vec![1, 2, 3, 4]), vec![2, 3]);

        let unbounded = Condition::new();
        assert_eq!(unbounded.window(vec![1, 2]), vec![1, 2]);
    }
}
