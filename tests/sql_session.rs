use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use cowork::engine::Engine;
use cowork::notify::NotifyHub;
use cowork::seed::Seed;
use cowork::wire::{self, CoworkFactory};

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let engine = Arc::new(Engine::new(Arc::new(NotifyHub::new())));
    let directory = Arc::new(Seed::bundled().unwrap().load_into(&engine).await.unwrap());
    let factory = Arc::new(CoworkFactory::new(engine.clone(), directory));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let factory = factory.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, factory, None).await;
            });
        }
    });

    (addr, engine)
}

async fn connect(
    addr: SocketAddr,
    user: &str,
    password: &str,
) -> Result<tokio_postgres::Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("cowork")
        .user(user)
        .password(password);

    let (client, conn) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = conn.await;
    });
    Ok(client)
}

async fn rows(client: &tokio_postgres::Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &tokio_postgres::Client, sql: &str) -> SqlState {
    let err = client.simple_query(sql).await.unwrap_err();
    err.code().cloned().unwrap_or_else(|| panic!("no SQLSTATE in {err}"))
}

// ── Sessions ─────────────────────────────────────────────────

#[tokio::test]
async fn login_and_list_rooms() {
    let (addr, _engine) = start_test_server().await;
    let client = connect(addr, "user1", "user123").await.unwrap();

    let rooms = rows(&client, "SELECT * FROM rooms").await;
    assert_eq!(rooms.len(), 6);
    assert_eq!(rooms[0].get("name"), Some("Orion Conference Room"));
    assert_eq!(rooms[3].get("is_available"), Some("f"));

    let big = rows(&client, "SELECT * FROM rooms WHERE capacity >= 20 AND amenity = 'projector'").await;
    assert_eq!(big.len(), 1);
    assert_eq!(big[0].get("id"), Some("1"));
}

#[tokio::test]
async fn wrong_password_rejected() {
    let (addr, _engine) = start_test_server().await;
    assert!(connect(addr, "user1", "nope").await.is_err());
    assert!(connect(addr, "ghost", "user123").await.is_err());
}

#[tokio::test]
async fn overlapping_request_warns_then_forces() {
    let (addr, engine) = start_test_server().await;
    let client = connect(addr, "user2", "user123").await.unwrap();

    // Room 1 is confirmed 09:00-12:00 on the 15th.
    let insert = "INSERT INTO reservations VALUES \
                  (1, 'Standup', '2025-07-15T11:00', '2025-07-15T12:30', 4)";
    assert_eq!(sqlstate(&client, insert).await, SqlState::EXCLUSION_VIOLATION);
    assert_eq!(engine.reservation_count(), 4);

    let forced = "INSERT INTO reservations VALUES \
                  (1, 'Standup', '2025-07-15T11:00', '2025-07-15T12:30', 4, NULL, NULL, true)";
    let created = rows(&client, forced).await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].get("id"), Some("5"));
    assert_eq!(created[0].get("user_id"), Some("3"));
    assert_eq!(created[0].get("status"), Some("pending"));

    let pending = rows(&client, "SELECT * FROM reservations WHERE status = 'pending'").await;
    let flagged: Vec<_> = pending
        .iter()
        .filter(|r| r.get("in_conflict") == Some("t"))
        .filter_map(|r| r.get("id"))
        .collect();
    assert_eq!(flagged, vec!["5"]);
}

#[tokio::test]
async fn approval_is_admin_only_and_checked() {
    let (addr, _engine) = start_test_server().await;
    let user = connect(addr, "user1", "user123").await.unwrap();
    let admin = connect(addr, "admin", "admin123").await.unwrap();

    let forced = "INSERT INTO reservations VALUES \
                  (1, 'Overlap', '2025-07-15T10:00', '2025-07-15T11:00', 2, NULL, NULL, true)";
    rows(&user, forced).await;

    let approve = "UPDATE reservations SET status = 'confirmed' WHERE id = 5";
    assert_eq!(sqlstate(&user, approve).await, SqlState::INSUFFICIENT_PRIVILEGE);
    assert_eq!(sqlstate(&admin, approve).await, SqlState::EXCLUSION_VIOLATION);

    admin
        .simple_query("UPDATE reservations SET status = 'rejected' WHERE id = 5")
        .await
        .unwrap();
    let after = rows(&admin, "SELECT * FROM reservations WHERE id = 5").await;
    assert_eq!(after[0].get("status"), Some("rejected"));

    // Rejected is terminal.
    assert_eq!(sqlstate(&admin, approve).await, SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE);

    // Seeded pending request 3 has a free slot.
    let approved = admin
        .execute("UPDATE reservations SET status = 'confirmed' WHERE id = $1", &[&"3"])
        .await
        .unwrap();
    assert_eq!(approved, 1);
    let three = rows(&admin, "SELECT * FROM reservations WHERE id = 3").await;
    assert_eq!(three[0].get("status"), Some("confirmed"));
}

#[tokio::test]
async fn owners_manage_their_reservations() {
    let (addr, engine) = start_test_server().await;
    let owner = connect(addr, "user1", "user123").await.unwrap();
    let other = connect(addr, "user2", "user123").await.unwrap();

    // Reservation 3 belongs to user1.
    let retitle = "UPDATE reservations SET title = 'Client Review' WHERE id = 3";
    assert_eq!(sqlstate(&other, retitle).await, SqlState::INSUFFICIENT_PRIVILEGE);
    owner.simple_query(retitle).await.unwrap();
    assert_eq!(engine.get_reservation(3).await.unwrap().title, "Client Review");

    // A pending request cannot be extended, but it can be moved.
    let extend = "UPDATE reservations SET end_time = '2025-07-17T12:30' WHERE id = 3";
    assert_eq!(sqlstate(&owner, extend).await, SqlState::INVALID_PARAMETER_VALUE);
    owner
        .simple_query("UPDATE reservations SET start_time = '2025-07-17T09:30' WHERE id = 3")
        .await
        .unwrap();
    let three = rows(&owner, "SELECT * FROM reservations WHERE id = 3").await;
    assert_eq!(three[0].get("start_time"), Some("2025-07-17T09:30:00"));
    assert_eq!(three[0].get("end_time"), Some("2025-07-17T11:30:00"));
    // Two hours at 35000 an hour.
    assert_eq!(three[0].get("estimated_cost"), Some("70000"));

    let delete = "DELETE FROM reservations WHERE id = 3";
    assert_eq!(sqlstate(&other, delete).await, SqlState::INSUFFICIENT_PRIVILEGE);
    assert_eq!(owner.execute(delete, &[]).await.unwrap(), 1);
    assert_eq!(owner.execute(delete, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn bound_parameters_stay_literal() {
    let (addr, _engine) = start_test_server().await;
    let client = connect(addr, "user2", "user123").await.unwrap();

    let created = client
        .query(
            "INSERT INTO reservations VALUES ($1, $2, $3, $4, $5)",
            &[&"2", &"Pay $1 deposit", &"2025-07-20T09:00", &"2025-07-20T10:00", &"3"],
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].get::<_, &str>("title"), "Pay $1 deposit");
    assert_eq!(created[0].get::<_, i64>("id"), 5);
    assert_eq!(created[0].get::<_, i64>("estimated_cost"), 35_000);

    let updated = client
        .execute(
            "UPDATE reservations SET title = $2 WHERE id = $1",
            &[&"5", &"Bring $1 and $2"],
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let found = client
        .query(
            "SELECT * FROM reservations WHERE room_id = $1 AND status = $2",
            &[&"2", &"pending"],
        )
        .await
        .unwrap();
    let ids: Vec<i64> = found.iter().map(|r| r.get("id")).collect();
    assert_eq!(ids, vec![3, 5]);
    assert_eq!(found[1].get::<_, &str>("title"), "Bring $1 and $2");
    assert!(!found[1].get::<_, bool>("in_conflict"));
}

#[tokio::test]
async fn reservations_carry_estimated_cost() {
    let (addr, _engine) = start_test_server().await;
    let client = connect(addr, "user1", "user123").await.unwrap();

    let all = rows(&client, "SELECT * FROM reservations").await;
    let costs: Vec<_> = all.iter().map(|r| r.get("estimated_cost")).collect();
    // 3h at 50000, 4h at 40000, 1.5h at 35000, 2h at 85000.
    assert_eq!(
        costs,
        vec![Some("150000"), Some("160000"), Some("52500"), Some("170000")]
    );
}

#[tokio::test]
async fn room_changes_need_admin() {
    let (addr, engine) = start_test_server().await;
    let user = connect(addr, "user1", "user123").await.unwrap();
    let admin = connect(addr, "admin", "admin123").await.unwrap();

    let insert = "INSERT INTO rooms VALUES ('Lyra', 4, 2, 30000, 'meeting', 'whiteboard', 'Small room')";
    assert_eq!(sqlstate(&user, insert).await, SqlState::INSUFFICIENT_PRIVILEGE);
    let created = rows(&admin, insert).await;
    assert_eq!(created[0].get("id"), Some("7"));

    // Cascades to reservation 1.
    admin.simple_query("DELETE FROM rooms WHERE id = 1").await.unwrap();
    assert!(engine.get_reservation(1).await.is_none());
    assert_eq!(
        sqlstate(&admin, "SELECT * FROM conflicts WHERE room_id = 1 AND start_time >= '2025-07-15T09:00' AND end_time <= '2025-07-15T10:00'").await,
        SqlState::NO_DATA
    );
}

#[tokio::test]
async fn malformed_sql_is_a_syntax_error() {
    let (addr, _engine) = start_test_server().await;
    let client = connect(addr, "user1", "user123").await.unwrap();

    assert_eq!(sqlstate(&client, "SELECT * FROM bookings").await, SqlState::SYNTAX_ERROR);
    assert_eq!(
        sqlstate(&client, "UPDATE reservations SET status = 'pending' WHERE id = 3").await,
        SqlState::SYNTAX_ERROR
    );
}
