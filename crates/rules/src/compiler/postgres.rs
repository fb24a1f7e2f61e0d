//! PostgreSQL rendering of compiled predicates.
//!
//! Produces a parameterized boolean expression for a `WHERE` clause.
//! Document columns are JSONB and are read with `#>>` (text extraction by
//! key path); all literals, including key paths, are bound as typed
//! parameters that [`SqlFilter::bind`] attaches to a `sqlx` query.

use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::{Query, QueryAs};
use sqlx::Postgres;

use super::predicate::{Cast, CompareOp, FieldRef, Predicate};
use super::CompiledFilter;
use crate::evaluator::{stringify, to_f64};

/// Text that parses as a double precision number.
const NUMERIC_TEXT: &str = r"^\s*[-+]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][-+]?[0-9]+)?\s*$";

/// A bound parameter, typed the way the clause uses it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    TextArray(Vec<String>),
    FloatArray(Vec<f64>),
}

impl SqlParam {
    /// A comparison literal. Numeric casts bind `double precision`, text
    /// casts bind `text`; uncast columns keep the literal's own type.
    fn scalar(value: &Value, cast: Cast) -> Self {
        match (cast, value) {
            (Cast::Numeric, v) => match to_f64(v) {
                Some(f) => SqlParam::Float(f),
                None => SqlParam::Text(stringify(v)),
            },
            (Cast::Text, v) => SqlParam::Text(stringify(v)),
            (Cast::None, Value::String(s)) => SqlParam::Text(s.clone()),
            (Cast::None, Value::Bool(b)) => SqlParam::Bool(*b),
            (Cast::None, Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => SqlParam::Int(i),
                (None, Some(f)) => SqlParam::Float(f),
                (None, None) => SqlParam::Text(n.to_string()),
            },
            (Cast::None, v) => SqlParam::Text(stringify(v)),
        }
    }

    fn set(values: &[Value], cast: Cast) -> Self {
        let numeric = cast == Cast::Numeric || (cast == Cast::None && values.iter().all(Value::is_number));
        if numeric {
            SqlParam::FloatArray(values.iter().filter_map(to_f64).collect())
        } else {
            SqlParam::TextArray(values.iter().map(stringify).collect())
        }
    }
}

/// A rendered clause and its positional parameters (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<SqlParam>,
}

macro_rules! bind_all {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param.clone() {
                SqlParam::Text(v) => query.bind(v),
                SqlParam::Int(v) => query.bind(v),
                SqlParam::Float(v) => query.bind(v),
                SqlParam::Bool(v) => query.bind(v),
                SqlParam::TextArray(v) => query.bind(v),
                SqlParam::FloatArray(v) => query.bind(v),
            };
        }
        query
    }};
}

impl SqlFilter {
    /// Bind every parameter, in order, onto a query that embeds `clause`.
    /// Values the query binds before the clause must be bound first, with
    /// the clause rendered by [`render_from`].
    pub fn bind<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        bind_all!(query, &self.params)
    }

    /// [`SqlFilter::bind`] for `sqlx::query_as`.
    pub fn bind_as<'q, O>(
        &self,
        query: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> QueryAs<'q, Postgres, O, PgArguments> {
        bind_all!(query, &self.params)
    }
}

/// Render a predicate with parameters numbered from `$1`.
pub fn render(predicate: &Predicate) -> SqlFilter {
    render_from(predicate, 1)
}

/// Render with parameters numbered from `$first_param`, for appending to a
/// query that already binds other values.
pub fn render_from(predicate: &Predicate, first_param: usize) -> SqlFilter {
    let mut r = Renderer {
        params: Vec::new(),
        first_param,
    };
    let clause = r.predicate(predicate);
    SqlFilter {
        clause,
        params: r.params,
    }
}

/// Render a whole compilation result; an empty filter is `TRUE`.
pub fn render_filter(filter: &CompiledFilter) -> SqlFilter {
    match &filter.predicate {
        Some(p) => render(p),
        None => SqlFilter {
            clause: "TRUE".to_string(),
            params: Vec::new(),
        },
    }
}

struct Renderer {
    params: Vec<SqlParam>,
    first_param: usize,
}

impl Renderer {
    fn bind(&mut self, value: SqlParam) -> String {
        self.params.push(value);
        format!("${}", self.first_param + self.params.len() - 1)
    }

    fn predicate(&mut self, p: &Predicate) -> String {
        match p {
            Predicate::And { items } => self.join(items, " AND "),
            Predicate::Or { items } => self.join(items, " OR "),
            Predicate::Compare {
                field,
                op,
                value,
                cast,
                case_insensitive,
            } => {
                let mut lhs = self.operand(field, *cast);
                let param = if *case_insensitive {
                    SqlParam::Text(stringify(value))
                } else {
                    SqlParam::scalar(value, *cast)
                };
                let mut rhs = self.bind(param);
                if *case_insensitive {
                    lhs = format!("lower({lhs})");
                    rhs = format!("lower({rhs})");
                }
                let op = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "IS DISTINCT FROM",
                    CompareOp::Gt => ">",
                    CompareOp::Gte => ">=",
                    CompareOp::Lt => "<",
                    CompareOp::Lte => "<=",
                };
                format!("{lhs} {op} {rhs}")
            }
            Predicate::Like {
                field,
                pattern,
                case_insensitive,
                negated,
            } => {
                let lhs = self.text(field);
                let rhs = self.bind(SqlParam::Text(pattern.clone()));
                let not = if *negated { "NOT " } else { "" };
                let like = if *case_insensitive { "ILIKE" } else { "LIKE" };
                format!("{lhs} {not}{like} {rhs}")
            }
            Predicate::InSet {
                field,
                values,
                cast,
                case_insensitive,
                negated,
            } => {
                let mut lhs = self.operand(field, *cast);
                if *case_insensitive {
                    lhs = format!("lower({lhs})");
                }
                let set = self.bind(SqlParam::set(values, *cast));
                if *negated {
                    format!("({lhs} IS NULL OR NOT ({lhs} = ANY({set})))")
                } else {
                    format!("{lhs} = ANY({set})")
                }
            }
            Predicate::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let lhs = self.text(field);
                let rhs = self.bind(SqlParam::Text(pattern.clone()));
                let op = if *case_insensitive { "~*" } else { "~" };
                format!("{lhs} {op} {rhs}")
            }
            Predicate::IsNull { field, negated } => {
                let lhs = self.raw(field);
                if *negated {
                    format!("{lhs} IS NOT NULL")
                } else {
                    format!("{lhs} IS NULL")
                }
            }
            Predicate::Const { value } => if *value { "TRUE" } else { "FALSE" }.to_string(),
        }
    }

    fn join(&mut self, items: &[Predicate], sep: &str) -> String {
        let parts: Vec<String> = items.iter().map(|p| self.predicate(p)).collect();
        format!("({})", parts.join(sep))
    }

    /// Column as-is, or the text extraction of a document path.
    fn raw(&mut self, field: &FieldRef) -> String {
        match field {
            FieldRef::Column(name) => quote_ident(name),
            FieldRef::Document { column, path } if path.is_empty() => {
                format!("{}::text", quote_ident(column))
            }
            FieldRef::Document { column, path } => {
                let keys = self.bind(SqlParam::TextArray(path.clone()));
                format!("({} #>> {}::text[])", quote_ident(column), keys)
            }
        }
    }

    fn text(&mut self, field: &FieldRef) -> String {
        match field {
            FieldRef::Column(name) => format!("{}::text", quote_ident(name)),
            FieldRef::Document { .. } => self.raw(field),
        }
    }

    fn operand(&mut self, field: &FieldRef, cast: Cast) -> String {
        match cast {
            Cast::None => self.raw(field),
            Cast::Text => self.text(field),
            Cast::Numeric => {
                let t = self.text(field);
                format!("(CASE WHEN {t} ~ '{NUMERIC_TEXT}' THEN ({t})::double precision END)")
            }
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
