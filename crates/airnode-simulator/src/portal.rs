//! Status page and configuration form over a std TCP listener

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use airnode_core::app_state::SharedStatus;
use airnode_core::provisioning::ProvisioningEvent;
use airnode_core::web::http::MAX_REQUEST_LEN;
use airnode_core::web::{Response, expected_len, handle_request, parse_request};
use log::{debug, info, warn};

/// Bind `addr` and serve the portal from a background thread.
pub fn spawn(
    addr: &str,
    status: Arc<SharedStatus>,
    submissions: Sender<ProvisioningEvent>,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    info!("portal: http://{}/", listener.local_addr()?);

    thread::Builder::new()
        .name("portal".into())
        .spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Err(e) = serve(stream, &status, &submissions) {
                            debug!("portal: connection error: {}", e);
                        }
                    }
                    Err(e) => warn!("portal: accept error: {}", e),
                }
            }
        })?;

    Ok(())
}

fn serve(
    mut stream: TcpStream,
    status: &SharedStatus,
    submissions: &Sender<ProvisioningEvent>,
) -> io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;

    let mut buf = vec![0u8; MAX_REQUEST_LEN];
    let mut len = 0;
    while len < buf.len() {
        let n = stream.read(&mut buf[len..])?;
        if n == 0 {
            break;
        }
        len += n;
        if expected_len(&buf[..len]).is_some_and(|total| len >= total) {
            break;
        }
    }
    if len == 0 {
        return Ok(());
    }

    let response = match parse_request(&buf[..len]) {
        Ok(request) => {
            let (response, submitted) = handle_request(&request, &status.snapshot());
            if let Some(config) = submitted {
                // The loop is gone only while the simulator shuts down.
                let _ = submissions.send(ProvisioningEvent::ConfigSubmitted(config));
            }
            response
        }
        Err(e) => {
            debug!("portal: bad request: {}", e);
            Response::for_error(e)
        }
    };

    stream.write_all(response.head().as_bytes())?;
    stream.write_all(response.body.as_bytes())?;
    stream.flush()
}
