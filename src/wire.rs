use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::auth::CefrsAuthSource;
use crate::engine::Engine;
use crate::observability;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

pub struct CefrsHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<CefrsQueryParser>,
}

impl CefrsHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(CefrsQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("campus error: {e}"),
            )))
        })
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let start = std::time::Instant::now();
        let result = self.dispatch_command(engine, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn dispatch_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertUser { id, name, role } => {
                engine.register_user(id, name, role).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteUser { id } => {
                engine.deactivate_user(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertFacility {
                id,
                name,
                kind,
                building,
                floor,
                capacity,
            } => {
                engine
                    .add_facility(id, name, kind, building, floor, capacity)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateFacility {
                id,
                name,
                capacity,
                status,
            } => {
                engine
                    .update_facility(id, name, capacity, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteFacility { id } => {
                engine.remove_facility(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertEquipment {
                id,
                name,
                category,
                quantity,
            } => {
                engine
                    .add_equipment(id, name, category, quantity)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateEquipment {
                id,
                name,
                quantity,
                status,
            } => {
                engine
                    .update_equipment(id, name, quantity, status)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteEquipment { id } => {
                engine.remove_equipment(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertReservation {
                id,
                facility_id,
                requester,
                slot,
                purpose,
            } => {
                engine
                    .request_reservation(id, facility_id, requester, slot, purpose)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertBorrowing {
                id,
                equipment_id,
                requester,
                quantity,
                range,
                purpose,
            } => {
                engine
                    .request_borrowing(id, equipment_id, requester, quantity, range, purpose)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::SetReservationStatus {
                id,
                actor,
                status,
                notes,
            } => {
                engine
                    .set_reservation_status(id, actor, status, notes)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::SetBorrowingStatus {
                id,
                actor,
                status,
                notes,
                returned_on,
            } => {
                engine
                    .set_borrowing_status(id, actor, status, notes, returned_on)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::MarkNotificationRead { id, user_id } => {
                engine
                    .mark_notification_read(id, user_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::MarkAllNotificationsRead { user_id } => {
                engine
                    .mark_all_notifications_read(user_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE"))])
            }
            Command::SelectFacilities => {
                let facilities = engine.list_facilities().await;
                let schema = Arc::new(facility_schema());
                let rows: Vec<PgWireResult<_>> = facilities
                    .into_iter()
                    .map(|f| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&f.id.to_string())?;
                        encoder.encode_field(&f.name)?;
                        encoder.encode_field(&f.kind.as_str())?;
                        encoder.encode_field(&f.building)?;
                        encoder.encode_field(&f.floor)?;
                        encoder.encode_field(&(f.capacity as i32))?;
                        encoder.encode_field(&f.status.as_str())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectEquipment => {
                let equipment = engine.list_equipment().await;
                let schema = Arc::new(equipment_schema());
                let rows: Vec<PgWireResult<_>> = equipment
                    .into_iter()
                    .map(|e| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&e.id.to_string())?;
                        encoder.encode_field(&e.name)?;
                        encoder.encode_field(&e.category.as_str())?;
                        encoder.encode_field(&(e.quantity_total as i32))?;
                        encoder.encode_field(&e.status.as_str())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectAvailability {
                equipment_id,
                start_day,
                end_day,
            } => {
                let range = crate::model::DayRange {
                    start: start_day,
                    end: end_day,
                };
                let (total, available) = engine
                    .available_quantity(equipment_id, range)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&equipment_id.to_string())?;
                encoder.encode_field(&(total as i32))?;
                encoder.encode_field(&(available as i32))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectSchedule { facility_id, date } => {
                let reservations = engine
                    .day_schedule(facility_id, date)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(reservation_schema());
                let rows: Vec<PgWireResult<_>> = reservations
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encode_reservation(&mut encoder, &r)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectFreeWindows {
                facility_id,
                date,
                open,
                close,
            } => {
                let windows = engine
                    .free_windows(facility_id, date, open, close)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(free_window_schema());
                let fid = facility_id.to_string();
                let rows: Vec<PgWireResult<_>> = windows
                    .into_iter()
                    .map(|w| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&fid)?;
                        encoder.encode_field(&date)?;
                        encoder.encode_field(&w.start)?;
                        encoder.encode_field(&w.end)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectReservations { requester, status } => {
                let reservations = engine.list_reservations(requester, status).await;
                let schema = Arc::new(reservation_schema());
                let rows: Vec<PgWireResult<_>> = reservations
                    .into_iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encode_reservation(&mut encoder, &r)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectBorrowings { requester, status } => {
                let borrowings = engine.list_borrowings(requester, status).await;
                let schema = Arc::new(borrowing_schema());
                let rows: Vec<PgWireResult<_>> = borrowings
                    .into_iter()
                    .map(|b| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&b.id.to_string())?;
                        encoder.encode_field(&b.equipment_id.to_string())?;
                        encoder.encode_field(&b.requester.to_string())?;
                        encoder.encode_field(&(b.quantity as i32))?;
                        encoder.encode_field(&b.range.start)?;
                        encoder.encode_field(&b.range.end)?;
                        encoder.encode_field(&b.status.as_str())?;
                        encoder.encode_field(&b.actual_return_day)?;
                        encoder.encode_field(&b.purpose)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectNotifications { user_id, unread_only } => {
                let notifications = engine.notifications_for_user(user_id, unread_only);
                let schema = Arc::new(notification_schema());
                let rows: Vec<PgWireResult<_>> = notifications
                    .into_iter()
                    .map(|n| {
                        let payload = serde_json::to_string(&n).unwrap_or_default();
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&n.id.to_string())?;
                        encoder.encode_field(&n.kind.as_str())?;
                        encoder.encode_field(&n.title)?;
                        encoder.encode_field(&n.message)?;
                        encoder.encode_field(&n.reference.to_string())?;
                        encoder.encode_field(&n.created_at)?;
                        encoder.encode_field(&n.read)?;
                        encoder.encode_field(&payload)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectFacilityUsage => {
                let usage = engine.facility_usage().await;
                let schema = Arc::new(facility_usage_schema());
                let rows: Vec<PgWireResult<_>> = usage
                    .into_iter()
                    .map(|u| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&u.facility_id.to_string())?;
                        encoder.encode_field(&u.name)?;
                        encoder.encode_field(&(u.total as i64))?;
                        encoder.encode_field(&(u.approved as i64))?;
                        encoder.encode_field(&(u.pending as i64))?;
                        encoder.encode_field(&(u.rejected as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectEquipmentUsage => {
                let usage = engine.equipment_usage().await;
                let schema = Arc::new(equipment_usage_schema());
                let rows: Vec<PgWireResult<_>> = usage
                    .into_iter()
                    .map(|u| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&u.equipment_id.to_string())?;
                        encoder.encode_field(&u.name)?;
                        encoder.encode_field(&(u.quantity_total as i32))?;
                        encoder.encode_field(&(u.total_requests as i64))?;
                        encoder.encode_field(&(u.out_now as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectDashboard { today } => {
                let stats = engine.dashboard_stats(today).await;
                let schema = Arc::new(dashboard_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(stats.pending_reservations as i64))?;
                encoder.encode_field(&(stats.pending_borrowings as i64))?;
                encoder.encode_field(&(stats.active_reservations as i64))?;
                encoder.encode_field(&(stats.active_borrowings as i64))?;
                encoder.encode_field(&(stats.reservations_today as i64))?;
                encoder.encode_field(&(stats.borrowings_starting_today as i64))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Listen { channel } => {
                let user_id_str = channel.strip_prefix("user_").ok_or_else(|| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("invalid channel: {channel} (expected user_{{id}})"),
                    )))
                })?;
                let _user_id = Ulid::from_string(user_id_str).map_err(|e| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("bad ULID in channel: {e}"),
                    )))
                })?;
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
        }
    }
}

fn encode_reservation(
    encoder: &mut DataRowEncoder,
    r: &crate::model::ReservationInfo,
) -> PgWireResult<()> {
    encoder.encode_field(&r.id.to_string())?;
    encoder.encode_field(&r.facility_id.to_string())?;
    encoder.encode_field(&r.requester.to_string())?;
    encoder.encode_field(&r.slot.date)?;
    encoder.encode_field(&r.slot.start)?;
    encoder.encode_field(&r.slot.end)?;
    encoder.encode_field(&r.status.as_str())?;
    encoder.encode_field(&r.purpose)?;
    Ok(())
}

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn facility_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("kind", Type::VARCHAR),
        text_field("building", Type::VARCHAR),
        text_field("floor", Type::INT4),
        text_field("capacity", Type::INT4),
        text_field("status", Type::VARCHAR),
    ]
}

fn equipment_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("category", Type::VARCHAR),
        text_field("quantity_total", Type::INT4),
        text_field("status", Type::VARCHAR),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("equipment_id", Type::VARCHAR),
        text_field("total", Type::INT4),
        text_field("available", Type::INT4),
    ]
}

fn reservation_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("facility_id", Type::VARCHAR),
        text_field("requester", Type::VARCHAR),
        text_field("date", Type::INT8),
        text_field("start", Type::INT4),
        text_field("end", Type::INT4),
        text_field("status", Type::VARCHAR),
        text_field("purpose", Type::VARCHAR),
    ]
}

fn borrowing_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("equipment_id", Type::VARCHAR),
        text_field("requester", Type::VARCHAR),
        text_field("quantity", Type::INT4),
        text_field("start_day", Type::INT8),
        text_field("end_day", Type::INT8),
        text_field("status", Type::VARCHAR),
        text_field("returned_on", Type::INT8),
        text_field("purpose", Type::VARCHAR),
    ]
}

fn free_window_schema() -> Vec<FieldInfo> {
    vec![
        text_field("facility_id", Type::VARCHAR),
        text_field("date", Type::INT8),
        text_field("start", Type::INT4),
        text_field("end", Type::INT4),
    ]
}

fn notification_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("kind", Type::VARCHAR),
        text_field("title", Type::VARCHAR),
        text_field("message", Type::VARCHAR),
        text_field("reference", Type::VARCHAR),
        text_field("created_at", Type::INT8),
        text_field("read", Type::BOOL),
        text_field("payload", Type::VARCHAR),
    ]
}

fn facility_usage_schema() -> Vec<FieldInfo> {
    vec![
        text_field("facility_id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("total", Type::INT8),
        text_field("approved", Type::INT8),
        text_field("pending", Type::INT8),
        text_field("rejected", Type::INT8),
    ]
}

fn equipment_usage_schema() -> Vec<FieldInfo> {
    vec![
        text_field("equipment_id", Type::VARCHAR),
        text_field("name", Type::VARCHAR),
        text_field("quantity_total", Type::INT4),
        text_field("total_requests", Type::INT8),
        text_field("out_now", Type::INT8),
    ]
}

fn dashboard_schema() -> Vec<FieldInfo> {
    vec![
        text_field("pending_reservations", Type::INT8),
        text_field("pending_borrowings", Type::INT8),
        text_field("active_reservations", Type::INT8),
        text_field("active_borrowings", Type::INT8),
        text_field("reservations_today", Type::INT8),
        text_field("borrowings_starting_today", Type::INT8),
    ]
}

/// Result schema for a SELECT statement, by dialect table name.
fn schema_for_statement(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("AVAILABILITY") {
        availability_schema()
    } else if upper.contains("FREE_WINDOWS") {
        free_window_schema()
    } else if upper.contains("SCHEDULE") || upper.contains("RESERVATIONS") {
        reservation_schema()
    } else if upper.contains("BORROWINGS") {
        borrowing_schema()
    } else if upper.contains("NOTIFICATIONS") {
        notification_schema()
    } else if upper.contains("FACILITY_USAGE") {
        facility_usage_schema()
    } else if upper.contains("EQUIPMENT_USAGE") {
        equipment_usage_schema()
    } else if upper.contains("FACILITIES") {
        facility_schema()
    } else if upper.contains("EQUIPMENT") {
        equipment_schema()
    } else if upper.contains("DASHBOARD") {
        dashboard_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for CefrsHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CefrsQueryParser;

#[async_trait]
impl QueryParser for CefrsQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for_statement(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CefrsHandler {
    type Statement = String;
    type QueryParser = CefrsQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_command(&engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for_statement(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for_statement(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CefrsFactory {
    handler: Arc<CefrsHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<CefrsAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CefrsFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = CefrsAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CefrsHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CefrsFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(CefrsFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
