use std::sync::Arc;

use actix_web::{get, web, HttpRequest, HttpResponse};
use actix_ws::{AggregatedMessage, AggregatedMessageStream, ProtocolError, Session};
use tokio::sync::mpsc;

use crate::{domain::session::SessionEvent, error::AuditError, services::AuditService};

const EVENT_BUFFER: usize = 32;

/// Opens the session channel. The first text or binary message is the batch,
/// everything after that is progress pushed to the client.
#[get("/upload")]
pub async fn upload(
    req: HttpRequest,
    body: web::Payload,
    audit_service: web::Data<AuditService>,
) -> HttpResponse {
    let (response, session, messages) = match actix_ws::handle(&req, body) {
        Ok(parts) => parts,
        Err(e) => {
            log::error!("{}", AuditError::ChannelEstablishment(e.to_string()));
            return HttpResponse::BadRequest().body("Could not open websocket connection");
        }
    };

    // a batch may arrive split over continuation frames
    let max_batch_bytes = audit_service.max_batch_bytes();
    let messages = messages
        .max_frame_size(max_batch_bytes)
        .aggregate_continuations()
        .max_continuation_size(max_batch_bytes);
    actix_web::rt::spawn(run_session(audit_service.into_inner(), session, messages));

    response
}

async fn run_session(
    service: Arc<AuditService>,
    mut session: Session,
    mut messages: AggregatedMessageStream,
) {
    let batch = match receive_batch(&mut session, &mut messages).await {
        Ok(Some(batch)) => batch,
        Ok(None) => {
            log::info!("Client left before sending a batch");
            let _ = session.close(None).await;
            return;
        }
        Err(e) => {
            log::error!("Error reading message: {}", e);
            let _ = session.text(SessionEvent::InputRejected.to_string()).await;
            let _ = session.close(None).await;
            return;
        }
    };

    let (event_sender, event_receiver) = mpsc::channel(EVENT_BUFFER);
    let mut audit = service.start_session(event_sender);

    // the sender lives in `audit` and must be dropped for the forwarder to end
    let audit_run = async move {
        let outcome = audit.run(&batch).await;
        (outcome, audit.state())
    };
    let ((outcome, state), ()) = tokio::join!(
        audit_run,
        forward_events(event_receiver, session, messages)
    );

    match outcome {
        Ok(location) => log::info!(
            "Session finished in {:?}, report at {:?}",
            state,
            location.path
        ),
        Err(e) => log::warn!("Session ended in {:?}: {}", state, e),
    }
}

async fn receive_batch(
    session: &mut Session,
    messages: &mut AggregatedMessageStream,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    while let Some(message) = messages.recv().await {
        match message? {
            AggregatedMessage::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
            AggregatedMessage::Binary(bytes) => return Ok(Some(bytes.to_vec())),
            AggregatedMessage::Ping(bytes) => {
                if session.pong(&bytes).await.is_err() {
                    return Ok(None);
                }
            }
            AggregatedMessage::Close(reason) => {
                log::debug!("Client closed the channel: {:?}", reason);
                return Ok(None);
            }
            _ => {}
        }
    }

    Ok(None)
}

/// Pushes events to the client until the session drops its sender. Client
/// frames are still read meanwhile: a close, a read error or the end of the
/// stream returns early, which drops `events` and stops the session.
async fn forward_events(
    mut events: mpsc::Receiver<SessionEvent>,
    mut session: Session,
    mut messages: AggregatedMessageStream,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                if session.text(event.to_string()).await.is_err() {
                    log::warn!("Client disconnected, stopping the session");
                    return;
                }
            }
            message = messages.recv() => match message {
                Some(Ok(AggregatedMessage::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        log::warn!("Client disconnected, stopping the session");
                        return;
                    }
                }
                Some(Ok(AggregatedMessage::Close(reason))) => {
                    log::warn!("Client closed the channel mid-session: {:?}", reason);
                    let _ = session.close(reason).await;
                    return;
                }
                Some(Ok(_)) => log::debug!("Ignoring client message after the batch"),
                Some(Err(e)) => {
                    log::warn!("Error reading message mid-session: {}", e);
                    return;
                }
                None => {
                    log::warn!("Client disconnected, stopping the session");
                    return;
                }
            },
        }
    }

    let _ = session.close(None).await;
}
