//! Integration-Tests ueber einen echten WebSocket auf 127.0.0.1

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fernruf_auth::{AuthKonfig, AuthService};
use fernruf_core::UserId;
use fernruf_observability::FernrufMetriken;
use fernruf_signaling::{ws_router, SignalingState, WsKonfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRIST: Duration = Duration::from_secs(5);

fn state_mit(ws: WsKonfig) -> Arc<SignalingState> {
    let auth = Arc::new(AuthService::neu(AuthKonfig {
        pbkdf2_runden: 1_000,
        ..AuthKonfig::default()
    }));
    SignalingState::mit_ws_konfig(auth, FernrufMetriken::neu().unwrap(), ws)
}

fn state() -> Arc<SignalingState> {
    state_mit(WsKonfig::default())
}

/// Kurze Takte, damit der Keepalive im Test greift
fn schneller_keepalive() -> WsKonfig {
    WsKonfig {
        ping_intervall: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(300),
        ..WsKonfig::default()
    }
}

async fn server_starten(state: Arc<SignalingState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = ws_router(state).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn verbinden(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

fn registrieren(state: &SignalingState, name: &str) -> (UserId, String) {
    let (info, session) = state.auth.registrieren(name, "passwort", "").unwrap();
    (info.id, session.token)
}

async fn auth_senden(ws: &mut Client, token: &str) {
    let frame = json!({ "type": "auth-connect", "data": { "session_token": token } });
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Naechstes Text-Frame; `None` sobald der Server geschlossen hat
async fn naechster_text(ws: &mut Client) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(FRIST, ws.next())
            .await
            .expect("kein Frame innerhalb der Frist");
        match frame {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(andere)) => panic!("unerwartetes Frame: {andere:?}"),
        }
    }
}

/// Liest bis ein Frame vom Typ `typ` die Bedingung erfuellt
async fn warten_auf(ws: &mut Client, typ: &str, bedingung: impl Fn(&Value) -> bool) -> Value {
    loop {
        let frame = naechster_text(ws)
            .await
            .unwrap_or_else(|| panic!("Verbindung zu bevor '{typ}' kam"));
        if frame["type"] == typ && bedingung(&frame) {
            return frame;
        }
    }
}

/// Liest bis der Server die Verbindung beendet
async fn bis_geschlossen(ws: &mut Client) {
    while naechster_text(ws).await.is_some() {}
}

async fn warten_bis(bedingung: impl Fn() -> bool) {
    let ende = tokio::time::Instant::now() + FRIST;
    while !bedingung() {
        assert!(tokio::time::Instant::now() < ende, "Bedingung nicht erreicht");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn kontakt_status(frame: &Value, name: &str) -> Option<String> {
    frame["data"]
        .as_array()?
        .iter()
        .find(|k| k["username"] == name)
        .and_then(|k| k["status"].as_str())
        .map(String::from)
}

#[tokio::test]
async fn auth_error_kommt_vor_dem_schliessen() {
    let state = state();
    let addr = server_starten(Arc::clone(&state)).await;
    let mut ws = verbinden(addr).await;

    auth_senden(&mut ws, "gibt_es_nicht").await;

    let frame = naechster_text(&mut ws).await.expect("auth-error erwartet");
    assert_eq!(frame["type"], "auth-error");
    assert_eq!(frame["data"]["error"], "Invalid or expired session");
    // Danach nur noch Close bzw. Verbindungsende
    assert!(naechster_text(&mut ws).await.is_none());
    assert_eq!(state.presence.verbindungs_anzahl(), 0);
}

#[tokio::test]
async fn abgebrochener_client_wird_offline_gemeldet() {
    let state = state();
    let addr = server_starten(Arc::clone(&state)).await;
    let (alice_id, alice_token) = registrieren(&state, "alice");
    let (bob_id, bob_token) = registrieren(&state, "bob");
    assert!(state.kontakte.hinzufuegen(&alice_id, "bob"));

    let mut alice = verbinden(addr).await;
    auth_senden(&mut alice, &alice_token).await;
    warten_auf(&mut alice, "connection-confirmed", |_| true).await;

    let mut bob = verbinden(addr).await;
    auth_senden(&mut bob, &bob_token).await;
    warten_auf(&mut bob, "connection-confirmed", |_| true).await;
    warten_auf(&mut alice, "contacts-update", |f| {
        kontakt_status(f, "bob").as_deref() == Some("online")
    })
    .await;
    assert_eq!(state.presence.verbindungs_anzahl(), 2);

    // Ohne Close-Handshake
    drop(bob);

    warten_bis(|| !state.presence.ist_online(&bob_id)).await;
    assert_eq!(state.presence.verbindungs_anzahl(), 1);
    let frame = warten_auf(&mut alice, "contacts-update", |f| {
        kontakt_status(f, "bob").as_deref() == Some("offline")
    })
    .await;
    assert_eq!(frame["to"], alice_id.als_draht());

    drop(alice);
    warten_bis(|| state.presence.verbindungs_anzahl() == 0).await;
    assert_eq!(state.metriken.connected_clients.get(), 0);
}

#[tokio::test]
async fn zweite_bindung_beendet_erste_verbindung() {
    let state = state();
    let addr = server_starten(Arc::clone(&state)).await;
    let (id, token) = registrieren(&state, "alice");

    let mut erste = verbinden(addr).await;
    auth_senden(&mut erste, &token).await;
    warten_auf(&mut erste, "connection-confirmed", |_| true).await;

    let mut zweite = verbinden(addr).await;
    auth_senden(&mut zweite, &token).await;
    warten_auf(&mut zweite, "connection-confirmed", |_| true).await;

    // Die Schleife der ersten Verbindung ist beendet und hat geschlossen
    tokio::time::timeout(FRIST, bis_geschlossen(&mut erste))
        .await
        .expect("erste Verbindung bleibt offen");

    assert!(state.presence.ist_online(&id));
    assert_eq!(state.presence.verbindungs_anzahl(), 1);

    // Die neue Verbindung arbeitet weiter
    zweite
        .send(Message::Text(
            json!({ "type": "add-contact", "data": { "username": "niemand" } }).to_string(),
        ))
        .await
        .unwrap();
    let frame = warten_auf(&mut zweite, "add-contact-result", |_| true).await;
    assert_eq!(frame["data"]["success"], false);
}

#[tokio::test]
async fn stummer_client_wird_nach_keepalive_getrennt() {
    let state = state_mit(schneller_keepalive());
    let addr = server_starten(Arc::clone(&state)).await;
    let (id, token) = registrieren(&state, "alice");

    let mut ws = verbinden(addr).await;
    auth_senden(&mut ws, &token).await;
    warten_bis(|| state.presence.ist_online(&id)).await;

    // Client liest nicht mehr und beantwortet damit keine Pings
    warten_bis(|| state.presence.verbindungs_anzahl() == 0).await;
    assert!(!state.presence.ist_online(&id));
    drop(ws);
}

#[tokio::test]
async fn lesender_client_bleibt_verbunden() {
    let state = state_mit(schneller_keepalive());
    let addr = server_starten(Arc::clone(&state)).await;
    let (id, token) = registrieren(&state, "alice");

    let mut ws = verbinden(addr).await;
    auth_senden(&mut ws, &token).await;
    warten_auf(&mut ws, "connection-confirmed", |_| true).await;

    // Lesen genuegt, tungstenite beantwortet die Pings
    let leser = tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(state.presence.ist_online(&id));
    assert!(!leser.is_finished());
    leser.abort();
}

#[tokio::test]
async fn zu_grosse_nachricht_beendet_verbindung() {
    let state = state_mit(WsKonfig {
        max_nachricht_bytes: 1024,
        ..WsKonfig::default()
    });
    let addr = server_starten(Arc::clone(&state)).await;
    let (id, token) = registrieren(&state, "alice");

    let mut ws = verbinden(addr).await;
    auth_senden(&mut ws, &token).await;
    warten_auf(&mut ws, "connection-confirmed", |_| true).await;

    let riesig = json!({ "type": "add-contact", "data": { "username": "x".repeat(4096) } });
    // Der Server darf schon waehrend des Sendens abbrechen
    let _ = ws.send(Message::Text(riesig.to_string())).await;

    tokio::time::timeout(FRIST, bis_geschlossen(&mut ws))
        .await
        .expect("Verbindung bleibt trotz Uebergroesse offen");
    warten_bis(|| !state.presence.ist_online(&id)).await;
}
