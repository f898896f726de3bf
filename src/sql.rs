use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertUser {
        id: Ulid,
        name: String,
        role: Role,
    },
    DeleteUser {
        id: Ulid,
    },
    InsertFacility {
        id: Ulid,
        name: String,
        kind: FacilityKind,
        building: String,
        floor: i32,
        capacity: u32,
    },
    UpdateFacility {
        id: Ulid,
        name: String,
        capacity: u32,
        status: ResourceStatus,
    },
    DeleteFacility {
        id: Ulid,
    },
    InsertEquipment {
        id: Ulid,
        name: String,
        category: EquipmentCategory,
        quantity: u32,
    },
    UpdateEquipment {
        id: Ulid,
        name: String,
        quantity: u32,
        status: ResourceStatus,
    },
    DeleteEquipment {
        id: Ulid,
    },
    InsertReservation {
        id: Ulid,
        facility_id: Ulid,
        requester: Ulid,
        slot: TimeSlot,
        purpose: String,
    },
    InsertBorrowing {
        id: Ulid,
        equipment_id: Ulid,
        requester: Ulid,
        quantity: u32,
        range: DayRange,
        purpose: String,
    },
    SetReservationStatus {
        id: Ulid,
        actor: Ulid,
        status: ReservationStatus,
        notes: Option<String>,
    },
    SetBorrowingStatus {
        id: Ulid,
        actor: Ulid,
        status: BorrowingStatus,
        notes: Option<String>,
        returned_on: Option<Day>,
    },
    MarkNotificationRead {
        id: Ulid,
        user_id: Ulid,
    },
    MarkAllNotificationsRead {
        user_id: Ulid,
    },
    SelectFacilities,
    SelectEquipment,
    SelectAvailability {
        equipment_id: Ulid,
        start_day: Day,
        end_day: Day,
    },
    SelectSchedule {
        facility_id: Ulid,
        date: Day,
    },
    SelectFreeWindows {
        facility_id: Ulid,
        date: Day,
        open: Minutes,
        close: Minutes,
    },
    SelectReservations {
        requester: Option<Ulid>,
        status: Option<ReservationStatus>,
    },
    SelectBorrowings {
        requester: Option<Ulid>,
        status: Option<BorrowingStatus>,
    },
    SelectNotifications {
        user_id: Ulid,
        unread_only: bool,
    },
    SelectFacilityUsage,
    SelectEquipmentUsage,
    SelectDashboard {
        today: Day,
    },
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
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "users" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("users", 3, values.len()));
            }
            Ok(Command::InsertUser {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                role: parse_role(&values[2])?,
            })
        }
        "facilities" => {
            if values.len() < 6 {
                return Err(SqlError::WrongArity("facilities", 6, values.len()));
            }
            Ok(Command::InsertFacility {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                kind: FacilityKind::parse(&parse_string(&values[2])?)
                    .ok_or(SqlError::BadEnum("facility kind"))?,
                building: parse_string(&values[3])?,
                floor: parse_i32(&values[4])?,
                capacity: parse_u32(&values[5])?,
            })
        }
        "equipment" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("equipment", 4, values.len()));
            }
            Ok(Command::InsertEquipment {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                category: EquipmentCategory::parse(&parse_string(&values[2])?)
                    .ok_or(SqlError::BadEnum("equipment category"))?,
                quantity: parse_u32(&values[3])?,
            })
        }
        "reservations" => {
            if values.len() < 7 {
                return Err(SqlError::WrongArity("reservations", 7, values.len()));
            }
            Ok(Command::InsertReservation {
                id: parse_ulid(&values[0])?,
                facility_id: parse_ulid(&values[1])?,
                requester: parse_ulid(&values[2])?,
                slot: TimeSlot {
                    date: parse_i64(&values[3])?,
                    start: parse_i32(&values[4])?,
                    end: parse_i32(&values[5])?,
                },
                purpose: parse_string(&values[6])?,
            })
        }
        "borrowings" => {
            if values.len() < 7 {
                return Err(SqlError::WrongArity("borrowings", 7, values.len()));
            }
            Ok(Command::InsertBorrowing {
                id: parse_ulid(&values[0])?,
                equipment_id: parse_ulid(&values[1])?,
                requester: parse_ulid(&values[2])?,
                quantity: parse_u32(&values[3])?,
                range: DayRange {
                    start: parse_i64(&values[4])?,
                    end: parse_i64(&values[5])?,
                },
                purpose: parse_string(&values[6])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;

    let mut set: Vec<(String, &Expr)> = Vec::new();
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name)
                .ok_or_else(|| SqlError::Parse("empty assignment target".into()))?,
            _ => return Err(SqlError::Parse("unsupported assignment target".into())),
        };
        set.push((col, &a.value));
    }
    let set_expr = |col: &str| set.iter().find(|(c, _)| c == col).map(|(_, e)| *e);

    let filters = extract_eq_filters(selection)?;
    let filter_expr = |col: &str| filters.iter().find(|(c, _)| c == col).map(|(_, e)| *e);

    match table.as_str() {
        "facilities" => {
            let id = parse_ulid(filter_expr("id").ok_or(SqlError::MissingFilter("id"))?)?;
            let name = parse_string(set_expr("name").ok_or(SqlError::MissingAssignment("name"))?)?;
            let capacity =
                parse_u32(set_expr("capacity").ok_or(SqlError::MissingAssignment("capacity"))?)?;
            let status = ResourceStatus::parse(&parse_string(
                set_expr("status").ok_or(SqlError::MissingAssignment("status"))?,
            )?)
            .ok_or(SqlError::BadEnum("resource status"))?;
            Ok(Command::UpdateFacility { id, name, capacity, status })
        }
        "equipment" => {
            let id = parse_ulid(filter_expr("id").ok_or(SqlError::MissingFilter("id"))?)?;
            let name = parse_string(set_expr("name").ok_or(SqlError::MissingAssignment("name"))?)?;
            let quantity =
                parse_u32(set_expr("quantity").ok_or(SqlError::MissingAssignment("quantity"))?)?;
            let status = ResourceStatus::parse(&parse_string(
                set_expr("status").ok_or(SqlError::MissingAssignment("status"))?,
            )?)
            .ok_or(SqlError::BadEnum("resource status"))?;
            Ok(Command::UpdateEquipment { id, name, quantity, status })
        }
        "reservations" => {
            let id = parse_ulid(filter_expr("id").ok_or(SqlError::MissingFilter("id"))?)?;
            let status_str =
                parse_string(set_expr("status").ok_or(SqlError::MissingAssignment("status"))?)?;
            let status =
                ReservationStatus::parse(&status_str).ok_or(SqlError::BadEnum("reservation status"))?;
            let actor = parse_ulid(set_expr("actor").ok_or(SqlError::MissingAssignment("actor"))?)?;
            let notes = set_expr("notes").map(parse_string).transpose()?;
            Ok(Command::SetReservationStatus { id, actor, status, notes })
        }
        "borrowings" => {
            let id = parse_ulid(filter_expr("id").ok_or(SqlError::MissingFilter("id"))?)?;
            let status_str =
                parse_string(set_expr("status").ok_or(SqlError::MissingAssignment("status"))?)?;
            let status =
                BorrowingStatus::parse(&status_str).ok_or(SqlError::BadEnum("borrowing status"))?;
            let actor = parse_ulid(set_expr("actor").ok_or(SqlError::MissingAssignment("actor"))?)?;
            let notes = set_expr("notes").map(parse_string).transpose()?;
            let returned_on = set_expr("returned_on").map(parse_i64).transpose()?;
            Ok(Command::SetBorrowingStatus { id, actor, status, notes, returned_on })
        }
        "notifications" => {
            let read = set_expr("read").ok_or(SqlError::MissingAssignment("read"))?;
            if !parse_bool(read)? {
                return Err(SqlError::Unsupported("notifications can only be marked read".into()));
            }
            let user_id =
                parse_ulid(filter_expr("user_id").ok_or(SqlError::MissingFilter("user_id"))?)?;
            match filter_expr("id") {
                Some(id) => Ok(Command::MarkNotificationRead {
                    id: parse_ulid(id)?,
                    user_id,
                }),
                None => Ok(Command::MarkAllNotificationsRead { user_id }),
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = extract_eq_filters(&delete.selection)?;
    let id = filters
        .iter()
        .find(|(c, _)| c == "id")
        .map(|(_, e)| *e)
        .ok_or(SqlError::MissingFilter("id"))?;
    let id = parse_ulid(id)?;

    match table.as_str() {
        "users" => Ok(Command::DeleteUser { id }),
        "facilities" => Ok(Command::DeleteFacility { id }),
        "equipment" => Ok(Command::DeleteEquipment { id }),
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

    let filters = extract_eq_filters(&select.selection)?;
    let filter_expr = |col: &str| filters.iter().find(|(c, _)| c == col).map(|(_, e)| *e);

    match table.as_str() {
        "facilities" => Ok(Command::SelectFacilities),
        "equipment" => Ok(Command::SelectEquipment),
        "availability" => Ok(Command::SelectAvailability {
            equipment_id: parse_ulid(
                filter_expr("equipment_id").ok_or(SqlError::MissingFilter("equipment_id"))?,
            )?,
            start_day: parse_i64(
                filter_expr("start_day").ok_or(SqlError::MissingFilter("start_day"))?,
            )?,
            end_day: parse_i64(filter_expr("end_day").ok_or(SqlError::MissingFilter("end_day"))?)?,
        }),
        "schedule" => Ok(Command::SelectSchedule {
            facility_id: parse_ulid(
                filter_expr("facility_id").ok_or(SqlError::MissingFilter("facility_id"))?,
            )?,
            date: parse_i64(filter_expr("date").ok_or(SqlError::MissingFilter("date"))?)?,
        }),
        "free_windows" => Ok(Command::SelectFreeWindows {
            facility_id: parse_ulid(
                filter_expr("facility_id").ok_or(SqlError::MissingFilter("facility_id"))?,
            )?,
            date: parse_i64(filter_expr("date").ok_or(SqlError::MissingFilter("date"))?)?,
            open: parse_i32(filter_expr("open").ok_or(SqlError::MissingFilter("open"))?)?,
            close: parse_i32(filter_expr("close").ok_or(SqlError::MissingFilter("close"))?)?,
        }),
        "reservations" => {
            let requester = filter_expr("requester").map(parse_ulid).transpose()?;
            let status = filter_expr("status")
                .map(parse_string)
                .transpose()?
                .map(|s| ReservationStatus::parse(&s).ok_or(SqlError::BadEnum("reservation status")))
                .transpose()?;
            Ok(Command::SelectReservations { requester, status })
        }
        "borrowings" => {
            let requester = filter_expr("requester").map(parse_ulid).transpose()?;
            let status = filter_expr("status")
                .map(parse_string)
                .transpose()?
                .map(|s| BorrowingStatus::parse(&s).ok_or(SqlError::BadEnum("borrowing status")))
                .transpose()?;
            Ok(Command::SelectBorrowings { requester, status })
        }
        "notifications" => Ok(Command::SelectNotifications {
            user_id: parse_ulid(
                filter_expr("user_id").ok_or(SqlError::MissingFilter("user_id"))?,
            )?,
            unread_only: filter_expr("unread").map(parse_bool).transpose()?.unwrap_or(false),
        }),
        "facility_usage" => Ok(Command::SelectFacilityUsage),
        "equipment_usage" => Ok(Command::SelectEquipmentUsage),
        "dashboard" => Ok(Command::SelectDashboard {
            today: parse_i64(filter_expr("today").ok_or(SqlError::MissingFilter("today"))?)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Collect `col = value` pairs from an AND-joined WHERE tree.
fn extract_eq_filters(selection: &Option<Expr>) -> Result<Vec<(String, &Expr)>, SqlError> {
    fn walk<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
        match expr {
            Expr::BinaryOp { left, op, right } => match op {
                ast::BinaryOperator::And => {
                    walk(left, out)?;
                    walk(right, out)
                }
                ast::BinaryOperator::Eq => {
                    if let Some(col) = expr_column_name(left) {
                        out.push((col, right));
                    }
                    Ok(())
                }
                _ => Err(SqlError::Unsupported("only = and AND in WHERE".into())),
            },
            Expr::Nested(inner) => walk(inner, out),
            _ => Err(SqlError::Unsupported("unsupported WHERE clause".into())),
        }
    }

    let mut out = Vec::new();
    if let Some(sel) = selection {
        walk(sel, &mut out)?;
    }
    Ok(out)
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
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
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

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
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

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_role(expr: &Expr) -> Result<Role, SqlError> {
    Role::parse(&parse_string(expr)?).ok_or(SqlError::BadEnum("role"))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
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
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i32(expr: &Expr) -> Result<i32, SqlError> {
    let v = parse_i64(expr)?;
    i32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of i32 range")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
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
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MissingAssignment(&'static str),
    BadEnum(&'static str),
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
            SqlError::MissingAssignment(col) => write!(f, "missing assignment: {col}"),
            SqlError::BadEnum(what) => write!(f, "unrecognized {what}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const U: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_user() {
        let sql = format!("INSERT INTO users (id, name, role) VALUES ('{U}', 'Dana Reyes', 'STUDENT')");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertUser { id, name, role } => {
                assert_eq!(id.to_string(), U);
                assert_eq!(name, "Dana Reyes");
                assert_eq!(role, Role::Student);
            }
            _ => panic!("expected InsertUser, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_user_bad_role() {
        let sql = format!("INSERT INTO users (id, name, role) VALUES ('{U}', 'X', 'WIZARD')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::BadEnum(_))));
    }

    #[test]
    fn parse_insert_facility() {
        let sql = format!(
            "INSERT INTO facilities (id, name, kind, building, floor, capacity) \
             VALUES ('{U}', 'Hall A', 'AUDITORIUM', 'Main', 2, 200)"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertFacility { kind, floor, capacity, .. } => {
                assert_eq!(kind, FacilityKind::Auditorium);
                assert_eq!(floor, 2);
                assert_eq!(capacity, 200);
            }
            _ => panic!("expected InsertFacility, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_equipment() {
        let sql = format!(
            "INSERT INTO equipment (id, name, category, quantity) VALUES ('{U}', 'Projector', 'PROJECTOR', 3)"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertEquipment { category, quantity, .. } => {
                assert_eq!(category, EquipmentCategory::Projector);
                assert_eq!(quantity, 3);
            }
            _ => panic!("expected InsertEquipment, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation() {
        let sql = format!(
            "INSERT INTO reservations (id, facility_id, requester, date, start, \"end\", purpose) \
             VALUES ('{U}', '{U}', '{U}', 19900, 540, 600, 'club meeting')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertReservation { slot, purpose, .. } => {
                assert_eq!(slot, TimeSlot { date: 19900, start: 540, end: 600 });
                assert_eq!(purpose, "club meeting");
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_borrowing() {
        let sql = format!(
            "INSERT INTO borrowings (id, equipment_id, requester, quantity, start_day, end_day, purpose) \
             VALUES ('{U}', '{U}', '{U}', 2, 19900, 19905, 'lab session')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertBorrowing { quantity, range, .. } => {
                assert_eq!(quantity, 2);
                assert_eq!(range, DayRange { start: 19900, end: 19905 });
            }
            _ => panic!("expected InsertBorrowing, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_wrong_arity() {
        let sql = format!("INSERT INTO reservations (id) VALUES ('{U}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity(..))));
    }

    #[test]
    fn parse_update_facility() {
        let sql = format!(
            "UPDATE facilities SET name = 'Hall B', capacity = 150, status = 'MAINTENANCE' WHERE id = '{U}'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpdateFacility { capacity, status, .. } => {
                assert_eq!(capacity, 150);
                assert_eq!(status, ResourceStatus::Maintenance);
            }
            _ => panic!("expected UpdateFacility, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_equipment() {
        let sql = format!(
            "UPDATE equipment SET name = 'Projector', quantity = 5, status = 'AVAILABLE' WHERE id = '{U}'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpdateEquipment { quantity, .. } => assert_eq!(quantity, 5),
            _ => panic!("expected UpdateEquipment, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_catalogs() {
        assert_eq!(
            parse_sql("SELECT * FROM facilities").unwrap(),
            Command::SelectFacilities
        );
        assert_eq!(
            parse_sql("SELECT * FROM equipment").unwrap(),
            Command::SelectEquipment
        );
    }

    #[test]
    fn parse_update_reservation_status() {
        let sql = format!(
            "UPDATE reservations SET status = 'APPROVED', actor = '{U}', notes = 'ok' WHERE id = '{U}'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SetReservationStatus { status, notes, .. } => {
                assert_eq!(status, ReservationStatus::Approved);
                assert_eq!(notes.as_deref(), Some("ok"));
            }
            _ => panic!("expected SetReservationStatus, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_reservation_without_notes() {
        let sql = format!("UPDATE reservations SET status = 'CANCELLED', actor = '{U}' WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SetReservationStatus { status, notes, .. } => {
                assert_eq!(status, ReservationStatus::Cancelled);
                assert_eq!(notes, None);
            }
            _ => panic!("expected SetReservationStatus, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_reservation_missing_actor() {
        let sql = format!("UPDATE reservations SET status = 'APPROVED' WHERE id = '{U}'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingAssignment("actor"))
        ));
    }

    #[test]
    fn parse_update_borrowing_with_return_day() {
        let sql = format!(
            "UPDATE borrowings SET status = 'RETURNED', actor = '{U}', returned_on = 19908 WHERE id = '{U}'"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SetBorrowingStatus { status, returned_on, .. } => {
                assert_eq!(status, BorrowingStatus::Returned);
                assert_eq!(returned_on, Some(19908));
            }
            _ => panic!("expected SetBorrowingStatus, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_notification_read() {
        let sql = format!("UPDATE notifications SET read = true WHERE id = '{U}' AND user_id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::MarkNotificationRead { .. }));
    }

    #[test]
    fn parse_update_notifications_all_read() {
        let sql = format!("UPDATE notifications SET read = true WHERE user_id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::MarkAllNotificationsRead { .. }));
    }

    #[test]
    fn parse_update_notification_unread_rejected() {
        let sql = format!("UPDATE notifications SET read = false WHERE user_id = '{U}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_delete_facility() {
        let sql = format!("DELETE FROM facilities WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::DeleteFacility { .. }));
    }

    #[test]
    fn parse_delete_without_id() {
        let sql = "DELETE FROM facilities";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!(
            "SELECT * FROM availability WHERE equipment_id = '{U}' AND start_day = 19900 AND end_day = 19905"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectAvailability { start_day, end_day, .. } => {
                assert_eq!(start_day, 19900);
                assert_eq!(end_day, 19905);
            }
            _ => panic!("expected SelectAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_schedule() {
        let sql = format!("SELECT * FROM schedule WHERE facility_id = '{U}' AND date = 19900");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::SelectSchedule { date: 19900, .. }));
    }

    #[test]
    fn parse_select_free_windows() {
        let sql = format!(
            "SELECT * FROM free_windows WHERE facility_id = '{U}' AND date = 19900 AND open = 480 AND close = 1080"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectFreeWindows { open, close, .. } => {
                assert_eq!(open, 480);
                assert_eq!(close, 1080);
            }
            _ => panic!("expected SelectFreeWindows, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_reservations_filters_optional() {
        let cmd = parse_sql("SELECT * FROM reservations").unwrap();
        assert_eq!(
            cmd,
            Command::SelectReservations { requester: None, status: None }
        );

        let sql = format!("SELECT * FROM reservations WHERE requester = '{U}' AND status = 'PENDING'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectReservations { requester, status } => {
                assert!(requester.is_some());
                assert_eq!(status, Some(ReservationStatus::Pending));
            }
            _ => panic!("expected SelectReservations, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_notifications_unread() {
        let sql = format!("SELECT * FROM notifications WHERE user_id = '{U}' AND unread = true");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectNotifications { unread_only, .. } => assert!(unread_only),
            _ => panic!("expected SelectNotifications, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_reports() {
        assert_eq!(
            parse_sql("SELECT * FROM facility_usage").unwrap(),
            Command::SelectFacilityUsage
        );
        assert_eq!(
            parse_sql("SELECT * FROM equipment_usage").unwrap(),
            Command::SelectEquipmentUsage
        );
        assert_eq!(
            parse_sql("SELECT * FROM dashboard WHERE today = 19900").unwrap(),
            Command::SelectDashboard { today: 19900 }
        );
    }

    #[test]
    fn parse_listen() {
        let sql = format!("LISTEN user_{U}");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::Listen { channel } => assert_eq!(channel, format!("user_{U}")),
            _ => panic!("expected Listen, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO widgets (id) VALUES ('{U}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }

    #[test]
    fn parse_range_filter_rejected() {
        let sql = format!("SELECT * FROM reservations WHERE date >= 19900 AND requester = '{U}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }
}
