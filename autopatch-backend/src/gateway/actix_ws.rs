//! `/ws` endpoint: RPC requests in, RPC responses and broadcast events out

use super::events::EventBroadcaster;
use super::methods::dispatch;
use super::protocol::{RpcError, RpcRequest, RpcResponse};
use crate::scan::ScanManager;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use futures_util::StreamExt;
use std::sync::Arc;

pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    manager: web::Data<Arc<ScanManager>>,
    broadcaster: web::Data<Arc<EventBroadcaster>>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;

    let manager = manager.get_ref().clone();
    let broadcaster = broadcaster.get_ref().clone();
    let (client_id, mut events) = broadcaster.subscribe();
    log::info!("[WS] Client {} connected", client_id);

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match serde_json::to_string(&event) {
                        Ok(text) => {
                            if session.text(text).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::error!("[WS] Failed to serialize event: {}", e),
                    }
                }
                msg = msg_stream.next() => {
                    let Some(Ok(msg)) = msg else { break };
                    match msg {
                        Message::Text(text) => {
                            let response = match serde_json::from_str::<RpcRequest>(&text) {
                                Ok(request) => dispatch(request, &manager),
                                Err(e) => {
                                    log::debug!("[WS] Unparsable frame from {}: {}", client_id, e);
                                    RpcResponse::error(String::new(), RpcError::parse_error())
                                }
                            };
                            let Ok(text) = serde_json::to_string(&response) else { continue };
                            if session.text(text).await.is_err() {
                                break;
                            }
                        }
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(reason) => {
                            log::debug!("[WS] Client {} closed: {:?}", client_id, reason);
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        broadcaster.unsubscribe(&client_id);
        let _ = session.close(None).await;
        log::info!("[WS] Client {} disconnected", client_id);
    });

    Ok(response)
}
