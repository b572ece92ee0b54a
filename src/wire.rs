use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::accounts::{Account, Directory};
use crate::auth::CoworkAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{self, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError};

pub struct CoworkHandler {
    engine: Arc<Engine>,
    directory: Arc<Directory>,
    query_parser: Arc<CoworkQueryParser>,
}

impl CoworkHandler {
    pub fn new(engine: Arc<Engine>, directory: Arc<Directory>) -> Self {
        Self {
            engine,
            directory,
            query_parser: Arc::new(CoworkQueryParser),
        }
    }

    /// The account behind the session's startup `user`.
    fn resolve_account<C: ClientInfo>(&self, client: &C) -> PgWireResult<Account> {
        let user = client
            .metadata()
            .get("user")
            .ok_or_else(|| user_error("28000", "no user in startup message".into()))?;
        self.directory
            .lookup(user)
            .cloned()
            .ok_or_else(|| user_error("28000", format!("unknown user: {user}")))
    }

    async fn run(
        &self,
        account: &Account,
        query: &str,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();

        let result = self.execute_command(account, cmd, format).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Fetch a reservation the account may edit.
    async fn managed_reservation(
        &self,
        account: &Account,
        id: ReservationId,
    ) -> PgWireResult<Reservation> {
        let reservation = self
            .engine
            .get_reservation(id)
            .await
            .ok_or_else(|| engine_err(EngineError::ReservationNotFound(id)))?;
        if !account.can_manage(&reservation) {
            return Err(forbidden(&format!("reservation {id} belongs to another user")));
        }
        Ok(reservation)
    }

    /// Live rooms by id, for pricing reservation rows.
    async fn rooms_by_id(&self) -> HashMap<RoomId, Room> {
        self.engine
            .list_rooms(&RoomFilter::default())
            .await
            .into_iter()
            .map(|room| (room.id, room))
            .collect()
    }

    async fn execute_command(
        &self,
        account: &Account,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::InsertRoom { room } => {
                require_admin(account)?;
                let room = engine.create_room(room).await.map_err(engine_err)?;
                Ok(vec![room_response(vec![room], format)])
            }
            Command::UpdateRoom { id, patch } => {
                require_admin(account)?;
                engine.update_room(id, patch).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteRoom { id } => {
                require_admin(account)?;
                engine.delete_room(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectRooms { filter } => {
                Ok(vec![room_response(engine.list_rooms(&filter).await, format)])
            }
            Command::InsertReservation {
                room_id,
                title,
                span,
                attendees,
                notes,
                contact_phone,
                force,
            } => {
                let input = NewReservation {
                    room_id,
                    user_id: account.id,
                    title,
                    span,
                    attendees,
                    notes,
                    contact_phone,
                };
                let reservation = if force {
                    engine.create_reservation(input).await.map_err(engine_err)?
                } else {
                    match engine
                        .create_with_conflict_check(input)
                        .await
                        .map_err(engine_err)?
                    {
                        Submission::Created(r) => r,
                        Submission::ConflictWarning(warning) => {
                            return Err(conflict_warning(&warning));
                        }
                    }
                };
                let rooms = self.rooms_by_id().await;
                Ok(vec![reservation_response(
                    vec![reservation],
                    &rooms,
                    &HashSet::new(),
                    format,
                )])
            }
            Command::Approve { id } => {
                require_admin(account)?;
                engine.approve(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::Reject { id } => {
                require_admin(account)?;
                engine.reject(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::Extend { id, end } => {
                self.managed_reservation(account, id).await?;
                engine.extend(id, end).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::UpdateReservation { id, patch } => {
                self.managed_reservation(account, id).await?;
                engine
                    .update_with_conflict_check(id, patch)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteReservation { id } => {
                let deleted = match engine.get_reservation(id).await {
                    Some(r) if !account.can_manage(&r) => {
                        return Err(forbidden(&format!("reservation {id} belongs to another user")));
                    }
                    Some(_) => engine.delete_reservation(id).await.is_some(),
                    None => false,
                };
                Ok(vec![Response::Execution(
                    Tag::new("DELETE").with_rows(usize::from(deleted)),
                )])
            }
            Command::SelectReservations { filter } => {
                let reservations = engine.list_reservations(&filter).await;
                let flagged = engine.pending_conflicts().await;
                let rooms = self.rooms_by_id().await;
                Ok(vec![reservation_response(reservations, &rooms, &flagged, format)])
            }
            Command::SelectConflicts {
                room_id,
                span,
                exclude_id,
            } => {
                let candidate = Candidate {
                    room_id,
                    span,
                    exclude_id,
                };
                let conflicts = engine.conflicts_for(&candidate).await.map_err(engine_err)?;
                let rooms = self.rooms_by_id().await;
                Ok(vec![reservation_response(
                    conflicts,
                    &rooms,
                    &HashSet::new(),
                    format,
                )])
            }
        }
    }
}

// ── Result sets ──────────────────────────────────────────────────

const ROOM_COLUMNS: [(&str, Type); 11] = [
    ("id", Type::INT8),
    ("name", Type::VARCHAR),
    ("type", Type::VARCHAR),
    ("capacity", Type::INT8),
    ("floor", Type::INT4),
    ("hourly_rate", Type::INT8),
    ("amenities", Type::VARCHAR),
    ("is_available", Type::BOOL),
    ("description", Type::VARCHAR),
    ("parking_cars", Type::INT8),
    ("parking_motorcycles", Type::INT8),
];

const RESERVATION_COLUMNS: [(&str, Type); 13] = [
    ("id", Type::INT8),
    ("room_id", Type::INT8),
    ("user_id", Type::INT8),
    ("title", Type::VARCHAR),
    ("start_time", Type::VARCHAR),
    ("end_time", Type::VARCHAR),
    ("attendees", Type::INT8),
    ("notes", Type::VARCHAR),
    ("contact_phone", Type::VARCHAR),
    ("status", Type::VARCHAR),
    ("created_at", Type::VARCHAR),
    ("in_conflict", Type::BOOL),
    ("estimated_cost", Type::INT8),
];

/// Field list in the result formats the client bound. Extended-protocol
/// clients may ask for binary columns.
fn schema(columns: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(idx))
        })
        .collect()
}

fn room_schema(format: &Format) -> Vec<FieldInfo> {
    schema(&ROOM_COLUMNS, format)
}

fn reservation_schema(format: &Format) -> Vec<FieldInfo> {
    schema(&RESERVATION_COLUMNS, format)
}

fn int8(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn room_response(rooms: Vec<Room>, format: &Format) -> Response {
    let schema = Arc::new(room_schema(format));
    let rows: Vec<PgWireResult<_>> = rooms
        .into_iter()
        .map(|room| {
            let amenities = room.amenities.iter().cloned().collect::<Vec<_>>().join(",");
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&int8(room.id))?;
            encoder.encode_field(&room.name)?;
            encoder.encode_field(&room.kind)?;
            encoder.encode_field(&i64::from(room.capacity))?;
            encoder.encode_field(&room.floor)?;
            encoder.encode_field(&int8(room.hourly_rate))?;
            encoder.encode_field(&amenities)?;
            encoder.encode_field(&room.is_available)?;
            encoder.encode_field(&room.description)?;
            encoder.encode_field(&i64::from(room.parking_cars))?;
            encoder.encode_field(&i64::from(room.parking_motorcycles))?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

/// `flagged` marks pending reservations whose approval would currently fail.
/// `estimated_cost` is NULL when the room is gone.
fn reservation_response(
    reservations: Vec<Reservation>,
    rooms: &HashMap<RoomId, Room>,
    flagged: &HashSet<ReservationId>,
    format: &Format,
) -> Response {
    let schema = Arc::new(reservation_schema(format));
    let rows: Vec<PgWireResult<_>> = reservations
        .into_iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&int8(r.id))?;
            encoder.encode_field(&int8(r.room_id))?;
            encoder.encode_field(&int8(r.user_id))?;
            encoder.encode_field(&r.title)?;
            encoder.encode_field(&format_timestamp(r.span.start))?;
            encoder.encode_field(&format_timestamp(r.span.end))?;
            encoder.encode_field(&i64::from(r.attendees))?;
            encoder.encode_field(&r.notes)?;
            encoder.encode_field(&r.contact_phone)?;
            encoder.encode_field(&r.status.to_string())?;
            encoder.encode_field(&format_timestamp(r.created_at))?;
            encoder.encode_field(&flagged.contains(&r.id))?;
            let cost = rooms.get(&r.room_id).map(|room| int8(r.estimated_cost(room)));
            encoder.encode_field(&cost)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

/// Row shape a statement produces, judged from its text so it also works
/// before `$N` parameters are bound.
fn result_schema(sql: &str, format: &Format) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    let returns_rows = upper.trim_start().starts_with("SELECT") || upper.trim_start().starts_with("INSERT");
    if !returns_rows {
        return vec![];
    }
    if upper.contains("RESERVATIONS") || upper.contains("CONFLICTS") {
        reservation_schema(format)
    } else if upper.contains("ROOMS") {
        room_schema(format)
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for CoworkHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let account = self.resolve_account(client)?;
        self.run(&account, query, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CoworkQueryParser;

#[async_trait]
impl QueryParser for CoworkQueryParser {
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
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(
            stmt,
            column_format.unwrap_or(&Format::UnifiedText),
        ))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CoworkHandler {
    type Statement = String;
    type QueryParser = CoworkQueryParser;

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
        let account = self.resolve_account(client)?;
        let sql = substitute_params(portal);
        self.run(&account, &sql, &portal.result_column_format)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| user_error("42601", "statement produced no response".into()))
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
        // Result formats are unknown until Bind.
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement, &Format::UnifiedText),
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
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
            &target.result_column_format,
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
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute(&portal.statement.statement, &params)
}

/// One left-to-right pass over the statement text. Bound values are
/// emitted as literals and never rescanned, so a `$N` inside a value stays
/// text. Placeholders past the bound count are left as written.
fn substitute(sql: &str, params: &[Option<String>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let param = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| params.get(idx));
        match param {
            Some(Some(text)) => {
                out.push('\'');
                out.push_str(&text.replace('\'', "''"));
                out.push('\'');
            }
            Some(None) => out.push_str("NULL"),
            None => out.push_str(&rest[pos..pos + 1 + digits]),
        }
        rest = &after[digits..];
    }
    out.push_str(rest);
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CoworkFactory {
    handler: Arc<CoworkHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<CoworkAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CoworkFactory {
    pub fn new(engine: Arc<Engine>, directory: Arc<Directory>) -> Self {
        let auth_source = CoworkAuthSource::new(directory.clone());
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CoworkHandler::new(engine, directory)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CoworkFactory {
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

/// Serve one client until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<CoworkFactory>,
    tls_acceptor: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    pgwire::tokio::process_socket(socket, tls_acceptor, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn engine_error_code(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) | EngineError::LimitExceeded(_) => "22023",
        EngineError::RoomNotFound(_) | EngineError::ReservationNotFound(_) => "02000",
        EngineError::Conflict(_) => "23P01",
        EngineError::InvalidTransition { .. } => "55000",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(engine_error_code(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

fn forbidden(message: &str) -> PgWireError {
    user_error("42501", format!("permission denied: {message}"))
}

fn require_admin(account: &Account) -> PgWireResult<()> {
    if account.is_admin() {
        Ok(())
    } else {
        Err(forbidden("admin role required"))
    }
}

fn conflict_warning(warning: &ConflictWarning) -> PgWireError {
    let ids = warning
        .conflicting
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    user_error(
        "23P01",
        format!(
            "room {} is already booked ({ids}) during {}; resubmit with force = true to queue it for approval",
            warning.room_id, warning.span
        ),
    )
}

#[cfg(test)]
mod tests {
    use pgwire::api::results::FieldFormat;

    use super::*;

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM rooms"), 0);
        assert_eq!(count_params("UPDATE rooms SET name = $2 WHERE id = $1"), 2);
        assert_eq!(count_params("SELECT $10, $3"), 10);
    }

    #[test]
    fn substitute_quotes_and_nulls() {
        let sql = "INSERT INTO reservations VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";
        let mut params: Vec<Option<String>> = (1..=10).map(|i| Some(i.to_string())).collect();
        params[1] = Some("Bob's sync".into());
        params[5] = None;

        let out = substitute(sql, &params);
        assert!(out.contains("'Bob''s sync'"));
        assert!(out.contains(", NULL,"));
        assert!(out.ends_with("'9', '10')"));
    }

    #[test]
    fn substitute_leaves_bound_text_alone() {
        let sql = "SELECT * FROM reservations WHERE room_id = $1 AND status = $2";
        let params = vec![Some("1".to_string()), Some("pending $1".to_string())];
        assert_eq!(
            substitute(sql, &params),
            "SELECT * FROM reservations WHERE room_id = '1' AND status = 'pending $1'"
        );

        let params = vec![Some("Pay $2 deposit".to_string()), Some("x".to_string())];
        assert_eq!(substitute("VALUES ($1, $2)", &params), "VALUES ('Pay $2 deposit', 'x')");

        // unbound and bare dollars stay as written
        assert_eq!(substitute("SELECT $3, $, $1", &[Some("a".into())]), "SELECT $3, $, 'a'");
    }

    #[test]
    fn schema_follows_statement() {
        let text = Format::UnifiedText;
        assert_eq!(result_schema("SELECT * FROM rooms", &text).len(), ROOM_COLUMNS.len());
        assert_eq!(
            result_schema("select * from reservations where room_id = $1", &text).len(),
            RESERVATION_COLUMNS.len()
        );
        assert_eq!(
            result_schema("SELECT * FROM conflicts WHERE room_id = 1", &text).len(),
            RESERVATION_COLUMNS.len()
        );
        assert_eq!(
            result_schema("INSERT INTO rooms VALUES ('A', 1, 1, 1)", &text).len(),
            ROOM_COLUMNS.len()
        );
        assert!(
            result_schema("UPDATE reservations SET status = 'confirmed' WHERE id = 1", &text)
                .is_empty()
        );
        assert!(result_schema("DELETE FROM rooms WHERE id = 1", &text).is_empty());
    }

    #[test]
    fn schema_uses_bound_result_format() {
        let fields = reservation_schema(&Format::UnifiedBinary);
        assert!(fields.iter().all(|f| f.format() == FieldFormat::Binary));
        assert_eq!(fields.last().map(|f| f.name()), Some("estimated_cost"));

        let fields = room_schema(&Format::UnifiedText);
        assert!(fields.iter().all(|f| f.format() == FieldFormat::Text));
    }

    #[test]
    fn engine_errors_map_to_sqlstate() {
        assert_eq!(engine_error_code(&EngineError::Validation("x")), "22023");
        assert_eq!(engine_error_code(&EngineError::LimitExceeded("x")), "22023");
        assert_eq!(engine_error_code(&EngineError::RoomNotFound(1)), "02000");
        assert_eq!(engine_error_code(&EngineError::ReservationNotFound(1)), "02000");
        assert_eq!(engine_error_code(&EngineError::Conflict(1)), "23P01");
        assert_eq!(
            engine_error_code(&EngineError::InvalidTransition {
                id: 1,
                status: ReservationStatus::Rejected,
            }),
            "55000"
        );
    }
}
