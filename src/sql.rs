use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
///
/// The dialect is deliberately tiny: one `appointments` table plus the
/// `stale_appointments` pseudo-table that drives the retention purge.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertAppointment(NewAppointment),
    UpdateStatus {
        id: Ulid,
        status: Status,
    },
    SelectAppointments {
        filter: Filter,
    },
    DeleteAppointment {
        id: Ulid,
    },
    PurgeStale,
    Listen {
        channel: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "appointments" {
        return Err(SqlError::UnknownTable(table));
    }

    // Positional: scheduled_at, contract_number, driver_name, driver_id, truck_plate
    let values = extract_insert_values(insert)?;
    if values.len() < 5 {
        return Err(SqlError::WrongArity("appointments", 5, values.len()));
    }
    Ok(Command::InsertAppointment(NewAppointment {
        scheduled_at: parse_i64_expr(&values[0])?,
        contract_number: parse_string_expr(&values[1])?,
        driver_name: parse_string_expr(&values[2])?,
        driver_id: parse_string_expr(&values[3])?,
        truck_plate: parse_string_expr(&values[4])?,
    }))
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    if table != "appointments" {
        return Err(SqlError::UnknownTable(table));
    }

    let assignment = assignments
        .first()
        .ok_or(SqlError::Parse("UPDATE without SET".into()))?;
    let column = assignment_column(&assignment.target);
    if column.as_deref() != Some("status") {
        return Err(SqlError::Unsupported(
            "only the status column can be updated".into(),
        ));
    }
    let status = parse_status_expr(&assignment.value)?;
    let id = extract_where_id(selection)?;

    Ok(Command::UpdateStatus { id, status })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    match table.as_str() {
        // `DELETE FROM stale_appointments` — retention purge, no WHERE
        "stale_appointments" => Ok(Command::PurgeStale),
        "appointments" => {
            let id = extract_where_id(&delete.selection)?;
            Ok(Command::DeleteAppointment { id })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    if table != "appointments" {
        return Err(SqlError::UnknownTable(table));
    }

    let mut filter = Filter::default();
    if let Some(selection) = &select.selection {
        extract_list_filters(selection, &mut filter)?;
    }

    Ok(Command::SelectAppointments { filter })
}

/// Walk a WHERE tree of AND-joined equality filters into a [`Filter`].
/// Anything else (OR, comparisons, subqueries) is rejected rather than
/// silently dropped — a dropped predicate would widen the result set.
fn extract_list_filters(expr: &Expr, filter: &mut Filter) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => extract_list_filters(inner, filter),
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                extract_list_filters(left, filter)?;
                extract_list_filters(right, filter)
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("day") => {
                    filter.day = Some(parse_i64_expr(right)?);
                    Ok(())
                }
                Some("status") => {
                    filter.status = Some(parse_status_expr(right)?);
                    Ok(())
                }
                Some("driver_id") => {
                    filter.driver_id = Some(parse_string_expr(right)?);
                    Ok(())
                }
                Some(other) => Err(SqlError::Parse(format!("unknown filter column: {other}"))),
                None => Err(SqlError::Parse(format!("expected column, got {left}"))),
            },
            other => Err(SqlError::Unsupported(format!("{other} in WHERE clause"))),
        },
        other => Err(SqlError::Unsupported(format!("{other} in WHERE clause"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn assignment_column(target: &AssignmentTarget) -> Option<String> {
    match target {
        AssignmentTarget::ColumnName(name) => object_name_last(name),
        _ => None,
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            Value::Number(s, _) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_status_expr(expr: &Expr) -> Result<Status, SqlError> {
    parse_string_expr(expr)?
        .parse()
        .map_err(SqlError::Parse)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ULID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_appointment() {
        let sql = "INSERT INTO appointments (scheduled_at, contract_number, driver_name, driver_id, truck_plate) \
                   VALUES (1726394400000, 'CT-2024-001', 'Ana Souza', '12345678900', 'ABC1D23')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertAppointment(req) => {
                assert_eq!(req.scheduled_at, 1_726_394_400_000);
                assert_eq!(req.contract_number, "CT-2024-001");
                assert_eq!(req.driver_name, "Ana Souza");
                assert_eq!(req.driver_id, "12345678900");
                assert_eq!(req.truck_plate, "ABC1D23");
            }
            _ => panic!("expected InsertAppointment, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_too_few_values() {
        let sql = "INSERT INTO appointments VALUES (1726394400000, 'CT-1')";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::WrongArity("appointments", 5, 2))
        ));
    }

    #[test]
    fn parse_update_status() {
        let sql = format!("UPDATE appointments SET status = 'completed' WHERE id = '{ULID}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpdateStatus { id, status } => {
                assert_eq!(id.to_string(), ULID);
                assert_eq!(status, Status::Completed);
            }
            _ => panic!("expected UpdateStatus, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_bad_status() {
        let sql = format!("UPDATE appointments SET status = 'paused' WHERE id = '{ULID}'");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_update_non_status_column_rejected() {
        let sql = format!("UPDATE appointments SET driver_id = '99' WHERE id = '{ULID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_without_where_rejected() {
        let sql = "UPDATE appointments SET status = 'late'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_select_all() {
        let cmd = parse_sql("SELECT * FROM appointments").unwrap();
        assert_eq!(
            cmd,
            Command::SelectAppointments { filter: Filter::default() }
        );
    }

    #[test]
    fn parse_select_with_filters() {
        let sql = "SELECT * FROM appointments WHERE day = 1726358400000 AND status = 'pending' AND driver_id = '12345678900'";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::SelectAppointments { filter } => {
                assert_eq!(filter.day, Some(1_726_358_400_000));
                assert_eq!(filter.status, Some(Status::Pending));
                assert_eq!(filter.driver_id.as_deref(), Some("12345678900"));
            }
            _ => panic!("expected SelectAppointments, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_status_only() {
        let cmd = parse_sql("SELECT * FROM appointments WHERE status = 'late'").unwrap();
        match cmd {
            Command::SelectAppointments { filter } => {
                assert_eq!(filter.status, Some(Status::Late));
                assert_eq!(filter.day, None);
                assert_eq!(filter.driver_id, None);
            }
            _ => panic!("expected SelectAppointments, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_non_equality_where_rejected() {
        assert!(matches!(
            parse_sql("SELECT * FROM appointments WHERE status = 'late' OR driver_id = 'd1'"),
            Err(SqlError::Unsupported(_))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM appointments WHERE day > 1726358400000"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn parse_select_parenthesized_and_filters() {
        let sql = "SELECT * FROM appointments WHERE (day = 1726358400000 AND status = 'pending')";
        match parse_sql(sql).unwrap() {
            Command::SelectAppointments { filter } => {
                assert_eq!(filter.day, Some(1_726_358_400_000));
                assert_eq!(filter.status, Some(Status::Pending));
            }
            other => panic!("expected SelectAppointments, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_unknown_filter_column() {
        let sql = "SELECT * FROM appointments WHERE truck_plate = 'ABC1D23'";
        assert!(parse_sql(sql).is_err());
    }

    #[test]
    fn parse_delete_appointment() {
        let sql = format!("DELETE FROM appointments WHERE id = '{ULID}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::DeleteAppointment { id } => assert_eq!(id.to_string(), ULID),
            _ => panic!("expected DeleteAppointment, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_delete_without_id_rejected() {
        assert!(matches!(
            parse_sql("DELETE FROM appointments"),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn parse_purge_stale() {
        let cmd = parse_sql("DELETE FROM stale_appointments").unwrap();
        assert_eq!(cmd, Command::PurgeStale);
    }

    #[test]
    fn parse_listen() {
        let cmd = parse_sql("LISTEN driver_12345678900;").unwrap();
        match cmd {
            Command::Listen { channel } => assert_eq!(channel, "driver_12345678900"),
            _ => panic!("expected Listen, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = "INSERT INTO trucks VALUES ('ABC1D23')";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownTable(_))));
        assert!(parse_sql("SELECT * FROM drivers").is_err());
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
