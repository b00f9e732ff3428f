//! Realtime Commands
//!
//! Phoenix-channel websocket feed of `postgres_changes` events.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::channel::mpsc;
use gloo_timers::callback::Interval;
use log::{debug, warn};
use optimistic_store::{ChangeFilter, PushChannel, RawChange, RemoteError, Session, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use url::Url;
use web_sys::{CloseEvent, MessageEvent, WebSocket};

use crate::config::BackendConfig;

const HEARTBEAT_MS: u32 = 25_000;
const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl Frame {
    fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// `wss://{host}/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub fn socket_url(config: &BackendConfig) -> Result<Url, RemoteError> {
    let mut url = config.realtime_url()?;
    url.query_pairs_mut()
        .append_pair("apikey", &config.anon_key)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

pub fn channel_topic(filter: &ChangeFilter) -> String {
    format!("realtime:{}-{}", filter.collection, filter.owner)
}

pub fn join_frame(topic: &str, filter: &ChangeFilter, access_token: &str, reference: u64) -> String {
    let owned_rows = format!("{}=eq.{}", filter.owner_field, filter.owner);
    // Deletes carry only the primary key, so the server cannot filter them by owner
    let payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [
                { "event": "INSERT", "schema": "public", "table": filter.collection, "filter": owned_rows },
                { "event": "DELETE", "schema": "public", "table": filter.collection },
            ],
        },
        "access_token": access_token,
    });
    Frame::new(topic, "phx_join", payload, reference).encode()
}

pub fn heartbeat_frame(reference: u64) -> String {
    Frame::new("phoenix", "heartbeat", json!({}), reference).encode()
}

pub fn leave_frame(topic: &str, reference: u64) -> String {
    Frame::new(topic, "phx_leave", json!({}), reference).encode()
}

/// Extract a change from an inbound frame; control traffic yields `None`.
///
/// `Decode` errors are about one frame. Any other error means the channel
/// is no longer delivering changes.
pub fn decode_frame(text: &str) -> Result<Option<RawChange>, RemoteError> {
    let frame: Frame = serde_json::from_str(text).map_err(|e| RemoteError::Decode(e.to_string()))?;

    match frame.event.as_str() {
        "postgres_changes" => {
            let data = &frame.payload["data"];
            let Some(event_type) = data["type"].as_str() else {
                return Err(RemoteError::Decode("change without type".to_string()));
            };
            Ok(Some(RawChange::new(
                event_type,
                data["record"].clone(),
                data["old_record"].clone(),
            )))
        }
        "phx_reply" if frame.payload["status"] == "error" => Err(RemoteError::InvalidRequest(format!(
            "join of {} rejected: {}",
            frame.topic, frame.payload["response"]
        ))),
        "phx_error" => Err(RemoteError::Network(format!("channel {} crashed", frame.topic))),
        "phx_close" => Err(RemoteError::Network(format!("channel {} closed by server", frame.topic))),
        _ => Ok(None),
    }
}

fn next_ref(refs: &Cell<u64>) -> u64 {
    let reference = refs.get() + 1;
    refs.set(reference);
    reference
}

fn send(socket: &WebSocket, frame: &str) {
    if let Err(err) = socket.send_with_str(frame) {
        warn!("realtime send failed: {:?}", err);
    }
}

pub struct RealtimeChannel {
    config: BackendConfig,
    access_token: String,
}

impl RealtimeChannel {
    pub fn new(config: BackendConfig, session: &Session) -> Self {
        Self {
            config,
            access_token: session.access_token.clone(),
        }
    }
}

impl PushChannel for RealtimeChannel {
    fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, RemoteError> {
        let url = socket_url(&self.config)?;
        let socket = WebSocket::new(url.as_str()).map_err(|e| RemoteError::Network(format!("{:?}", e)))?;
        let topic = channel_topic(&filter);
        let refs = Rc::new(Cell::new(0));
        let (sender, events) = mpsc::unbounded::<RawChange>();
        let sender = Rc::new(RefCell::new(Some(sender)));

        let on_open = {
            let socket = socket.clone();
            let join = join_frame(&topic, &filter, &self.access_token, next_ref(&refs));
            let topic = topic.clone();
            Closure::<dyn FnMut()>::new(move || {
                debug!("realtime socket open, joining {}", topic);
                send(&socket, &join);
            })
        };

        let on_message = {
            let sender = sender.clone();
            Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                let Some(text) = event.data().as_string() else {
                    return;
                };
                match decode_frame(&text) {
                    Ok(Some(change)) => {
                        if let Some(sender) = sender.borrow().as_ref() {
                            let _ = sender.unbounded_send(change);
                        }
                    }
                    Ok(None) => {}
                    Err(err @ RemoteError::Decode(_)) => warn!("realtime: skipping frame: {}", err),
                    // A dead channel ends the stream so the feed is resubscribed
                    Err(err) => {
                        warn!("realtime: {}", err);
                        sender.borrow_mut().take();
                    }
                }
            })
        };

        // Ending the stream lets the listener finish
        let on_close = {
            let sender = sender.clone();
            Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
                warn!("realtime socket closed (code {})", event.code());
                sender.borrow_mut().take();
            })
        };

        socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        let heartbeat = {
            let socket = socket.clone();
            let refs = refs.clone();
            Interval::new(HEARTBEAT_MS, move || {
                if socket.ready_state() == WebSocket::OPEN {
                    send(&socket, &heartbeat_frame(next_ref(&refs)));
                }
            })
        };

        let teardown = move || {
            if socket.ready_state() == WebSocket::OPEN {
                send(&socket, &leave_frame(&topic, next_ref(&refs)));
            }
            socket.set_onopen(None);
            socket.set_onmessage(None);
            socket.set_onclose(None);
            let _ = socket.close();
            drop(heartbeat);
            drop((on_open, on_message, on_close));
            sender.borrow_mut().take();
            debug!("left {}", topic);
        };

        Ok(Subscription::new(events).on_unsubscribe(teardown))
    }
}
