use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom {
        room: NewRoom,
    },
    UpdateRoom {
        id: RoomId,
        patch: RoomPatch,
    },
    DeleteRoom {
        id: RoomId,
    },
    SelectRooms {
        filter: RoomFilter,
    },
    /// Requester comes from the session, not the statement.
    InsertReservation {
        room_id: RoomId,
        title: String,
        span: Span,
        attendees: u32,
        notes: String,
        contact_phone: Option<String>,
        force: bool,
    },
    Approve {
        id: ReservationId,
    },
    Reject {
        id: ReservationId,
    },
    Extend {
        id: ReservationId,
        end: Ms,
    },
    UpdateReservation {
        id: ReservationId,
        patch: ReservationPatch,
    },
    DeleteReservation {
        id: ReservationId,
    },
    SelectReservations {
        filter: ReservationFilter,
    },
    SelectConflicts {
        room_id: RoomId,
        span: Span,
        exclude_id: Option<ReservationId>,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(SqlError::Empty);
    }
    if trimmed
        .get(..7)
        .is_some_and(|head| head.eq_ignore_ascii_case("UPDATE "))
    {
        return parse_update(trimmed);
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "rooms" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("rooms", 4, values.len()));
            }
            let room = NewRoom {
                name: parse_string(&values[0])?,
                capacity: parse_u32(&values[1])?,
                floor: parse_i32(&values[2])?,
                hourly_rate: parse_u64(&values[3])?,
                kind: values.get(4).map(parse_string_or_null).transpose()?.flatten(),
                amenities: match values.get(5) {
                    Some(v) => parse_amenities(v)?,
                    None => Default::default(),
                },
                description: values.get(6).map(parse_string_or_null).transpose()?.flatten(),
                ..Default::default()
            };
            Ok(Command::InsertRoom { room })
        }
        "reservations" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("reservations", 5, values.len()));
            }
            let start = parse_timestamp_expr(&values[2])?;
            let end = parse_timestamp_expr(&values[3])?;
            Ok(Command::InsertReservation {
                room_id: parse_u64(&values[0])?,
                title: parse_string(&values[1])?,
                span: Span::try_new(start, end)
                    .ok_or_else(|| SqlError::Parse("end_time must be after start_time".into()))?,
                attendees: parse_u32(&values[4])?,
                notes: values
                    .get(5)
                    .map(parse_string_or_null)
                    .transpose()?
                    .flatten()
                    .unwrap_or_default(),
                contact_phone: values.get(6).map(parse_string_or_null).transpose()?.flatten(),
                force: values.get(7).map(parse_bool).transpose()?.unwrap_or(false),
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "rooms" => Ok(Command::DeleteRoom { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
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

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "rooms" => {
            let mut filter = RoomFilter::default();
            for (col, op, value) in &filters {
                match (col.as_str(), op) {
                    ("capacity", ast::BinaryOperator::GtEq) => {
                        filter.min_capacity = Some(parse_u32(value)?)
                    }
                    ("type", ast::BinaryOperator::Eq) => filter.kind = Some(parse_string(value)?),
                    ("amenity", ast::BinaryOperator::Eq) => {
                        filter.amenities.push(parse_string(value)?)
                    }
                    _ => return Err(SqlError::UnsupportedFilter(col.clone())),
                }
            }
            Ok(Command::SelectRooms { filter })
        }
        "reservations" => {
            let mut filter = ReservationFilter::default();
            for (col, op, value) in &filters {
                if *op != ast::BinaryOperator::Eq {
                    return Err(SqlError::UnsupportedFilter(col.clone()));
                }
                match col.as_str() {
                    "id" => filter.id = Some(parse_u64(value)?),
                    "room_id" => filter.room_id = Some(parse_u64(value)?),
                    "user_id" => filter.user_id = Some(parse_u64(value)?),
                    "status" => filter.status = Some(parse_status(value)?),
                    _ => return Err(SqlError::UnsupportedFilter(col.clone())),
                }
            }
            Ok(Command::SelectReservations { filter })
        }
        "conflicts" => {
            let (mut room_id, mut start, mut end, mut exclude_id) = (None, None, None, None);
            for (col, op, value) in &filters {
                match (col.as_str(), op) {
                    ("room_id", ast::BinaryOperator::Eq) => room_id = Some(parse_u64(value)?),
                    ("start_time", ast::BinaryOperator::GtEq) => {
                        start = Some(parse_timestamp_expr(value)?)
                    }
                    ("end_time", ast::BinaryOperator::LtEq) => {
                        end = Some(parse_timestamp_expr(value)?)
                    }
                    ("exclude_id", ast::BinaryOperator::Eq) => exclude_id = Some(parse_u64(value)?),
                    _ => return Err(SqlError::UnsupportedFilter(col.clone())),
                }
            }
            let start = start.ok_or(SqlError::MissingFilter("start_time"))?;
            let end = end.ok_or(SqlError::MissingFilter("end_time"))?;
            Ok(Command::SelectConflicts {
                room_id: room_id.ok_or(SqlError::MissingFilter("room_id"))?,
                span: Span::try_new(start, end)
                    .ok_or_else(|| SqlError::Parse("end_time must be after start_time".into()))?,
                exclude_id,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = 1 AND b >= 2 ...` into `(column, operator, value)` triples.
fn collect_filters(
    expr: &Expr,
    out: &mut Vec<(String, ast::BinaryOperator, Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_filters(left, out)?;
            collect_filters(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
            out.push((col, op.clone(), right.as_ref().clone()));
            Ok(())
        }
        Expr::Nested(inner) => collect_filters(inner, out),
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

// ── UPDATE ────────────────────────────────────────────────────

/// `UPDATE <table> SET col = value[, ...] WHERE id = N`
fn parse_update(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(sql)
        .map_err(|e| SqlError::Parse(e.to_string()))?;

    if !parser.parse_keyword(Keyword::UPDATE) {
        return Err(SqlError::Parse("expected UPDATE".into()));
    }
    let name = parser
        .parse_object_name(false)
        .map_err(|e| SqlError::Parse(e.to_string()))?;
    let table = object_name_last(&name).ok_or_else(|| SqlError::Parse("empty table name".into()))?;

    if !parser.parse_keyword(Keyword::SET) {
        return Err(SqlError::Parse("expected SET".into()));
    }
    let mut assignments = Vec::new();
    loop {
        let column = parser
            .parse_identifier()
            .map_err(|e| SqlError::Parse(e.to_string()))?;
        parser
            .expect_token(&Token::Eq)
            .map_err(|e| SqlError::Parse(e.to_string()))?;
        let value = parser.parse_expr().map_err(|e| SqlError::Parse(e.to_string()))?;
        assignments.push((column.value.to_lowercase(), value));
        if !parser.consume_token(&Token::Comma) {
            break;
        }
    }

    let selection = if parser.parse_keyword(Keyword::WHERE) {
        Some(parser.parse_expr().map_err(|e| SqlError::Parse(e.to_string()))?)
    } else {
        None
    };
    parser.consume_token(&Token::SemiColon);
    if parser.peek_token().token != Token::EOF {
        return Err(SqlError::Parse(format!(
            "unexpected trailing input: {}",
            parser.peek_token().token
        )));
    }
    let id = extract_where_id(&selection)?;

    match table.as_str() {
        "rooms" => update_room(id, &assignments),
        "reservations" => update_reservation(id, &assignments),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn update_room(id: RoomId, assignments: &[(String, Expr)]) -> Result<Command, SqlError> {
    let mut patch = RoomPatch::default();
    for (col, value) in assignments {
        match col.as_str() {
            "name" => patch.name = Some(parse_string(value)?),
            "type" => patch.kind = Some(parse_string(value)?),
            "capacity" => patch.capacity = Some(parse_u32(value)?),
            "floor" => patch.floor = Some(parse_i32(value)?),
            "hourly_rate" => patch.hourly_rate = Some(parse_u64(value)?),
            "amenities" => patch.amenities = Some(parse_amenities(value)?),
            "is_available" => patch.is_available = Some(parse_bool(value)?),
            "description" => patch.description = Some(parse_string(value)?),
            "parking_cars" => patch.parking_cars = Some(parse_u32(value)?),
            "parking_motorcycles" => patch.parking_motorcycles = Some(parse_u32(value)?),
            _ => return Err(SqlError::UnknownColumn(col.clone())),
        }
    }
    Ok(Command::UpdateRoom { id, patch })
}

fn update_reservation(id: ReservationId, assignments: &[(String, Expr)]) -> Result<Command, SqlError> {
    if let Some((_, value)) = assignments.iter().find(|(col, _)| col == "status") {
        if assignments.len() > 1 {
            return Err(SqlError::Unsupported(
                "status must be the only column in its UPDATE".into(),
            ));
        }
        return match parse_status(value)? {
            ReservationStatus::Confirmed => Ok(Command::Approve { id }),
            ReservationStatus::Rejected => Ok(Command::Reject { id }),
            ReservationStatus::Pending => Err(SqlError::Unsupported(
                "a reservation cannot be moved back to pending".into(),
            )),
        };
    }

    if let [(col, value)] = assignments
        && col == "end_time"
    {
        return Ok(Command::Extend {
            id,
            end: parse_timestamp_expr(value)?,
        });
    }

    let mut patch = ReservationPatch::default();
    for (col, value) in assignments {
        match col.as_str() {
            "title" => patch.title = Some(parse_string(value)?),
            "start_time" => patch.start = Some(parse_timestamp_expr(value)?),
            "end_time" => patch.end = Some(parse_timestamp_expr(value)?),
            "attendees" => patch.attendees = Some(parse_u32(value)?),
            "notes" => patch.notes = Some(parse_string_or_null(value)?.unwrap_or_default()),
            "contact_phone" => patch.contact_phone = Some(parse_string_or_null(value)?),
            _ => return Err(SqlError::UnknownColumn(col.clone())),
        }
    }
    Ok(Command::UpdateReservation { id, patch })
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

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<u64, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_u64(right)
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

fn parse_u64(expr: &Expr) -> Result<u64, SqlError> {
    let v = parse_i64_expr(expr)?;
    u64::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u64 range")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_i32(expr: &Expr) -> Result<i32, SqlError> {
    let v = parse_i64_expr(expr)?;
    i32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of i32 range")))
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    parse_string_or_null(expr)?.ok_or_else(|| SqlError::Parse("unexpected NULL".into()))
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) => Ok(Some(s.clone())),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

/// ISO-8601 text or integer milliseconds.
fn parse_timestamp_expr(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            parse_timestamp(s).ok_or_else(|| SqlError::Parse(format!("bad timestamp: {s}")))
        }
        _ => parse_i64_expr(expr),
    }
}

fn parse_status(expr: &Expr) -> Result<ReservationStatus, SqlError> {
    parse_string(expr)?.parse().map_err(SqlError::Parse)
}

/// Comma-separated list, e.g. `'projector, whiteboard'`.
fn parse_amenities(expr: &Expr) -> Result<std::collections::BTreeSet<String>, SqlError> {
    Ok(parse_string_or_null(expr)?
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    UnsupportedFilter(String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::UnsupportedFilter(col) => write!(f, "unsupported filter on {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
