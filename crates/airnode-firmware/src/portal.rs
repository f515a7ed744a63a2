//! Captive portal: DHCP and DNS on the access point, HTTP on both interfaces
//!
//! Request handling itself lives in `airnode_core::web`; these tasks only move
//! bytes between sockets and those functions.

use core::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use airnode_core::app_state::SharedStatus;
use airnode_core::provisioning::ProvisioningEvent;
use airnode_core::web::http::MAX_REQUEST_LEN;
use airnode_core::web::{Response, answer_query, expected_len, handle_request, parse_request};
use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use log::{debug, error, info, warn};

use crate::network::PROVISIONING_EVENTS;

const HTTP_PORT: u16 = 80;
const DNS_PORT: u16 = 53;
const DNS_PACKET_LEN: usize = 512;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve the status page and configuration form on one interface.
///
/// Spawned once per stack so the portal answers on the access point and, once
/// associated, on the station network.
#[embassy_executor::task(pool_size = 2)]
pub async fn http_task(stack: Stack<'static>, status: &'static SharedStatus) {
    let mut rx_buf = [0u8; 1024];
    let mut tx_buf = [0u8; 2048];
    let mut request = [0u8; MAX_REQUEST_LEN];

    loop {
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(CONNECTION_TIMEOUT));

        match socket.accept(HTTP_PORT).await {
            Ok(()) => {
                if let Err(e) = serve(&mut socket, &mut request, status).await {
                    debug!("http: connection error: {:?}", e);
                }
                socket.close();
                let _ = socket.flush().await;
            }
            Err(e) => {
                warn!("http: accept error: {:?}", e);
                Timer::after(Duration::from_millis(200)).await;
            }
        }

        socket.abort();
    }
}

async fn serve(
    socket: &mut TcpSocket<'_>,
    buf: &mut [u8],
    status: &SharedStatus,
) -> Result<(), embassy_net::tcp::Error> {
    let mut len = 0;
    while len < buf.len() {
        let n = socket.read(&mut buf[len..]).await?;
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
                PROVISIONING_EVENTS
                    .send(ProvisioningEvent::ConfigSubmitted(config))
                    .await;
            }
            response
        }
        Err(e) => {
            debug!("http: bad request: {}", e);
            Response::for_error(e)
        }
    };

    socket.write_all(response.head().as_bytes()).await?;
    socket.write_all(response.body.as_bytes()).await?;
    socket.flush().await
}

/// Answer every name lookup on the access point with the portal address, so
/// clients that join it land on the configuration pages.
#[embassy_executor::task]
pub async fn dns_task(stack: Stack<'static>, address: Ipv4Addr) {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buf = [0u8; DNS_PACKET_LEN * 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buf = [0u8; DNS_PACKET_LEN * 2];
    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buf, &mut tx_meta, &mut tx_buf);

    if let Err(e) = socket.bind(DNS_PORT) {
        error!("dns: bind failed: {:?}", e);
        return;
    }
    info!("dns: answering all queries with {}", address);

    let mut query = [0u8; DNS_PACKET_LEN];
    let mut answer = [0u8; DNS_PACKET_LEN];
    loop {
        let (n, peer) = match socket.recv_from(&mut query).await {
            Ok(received) => received,
            Err(e) => {
                debug!("dns: receive error: {:?}", e);
                continue;
            }
        };

        match answer_query(&query[..n], address.octets(), &mut answer) {
            Ok(len) => {
                if let Err(e) = socket.send_to(&answer[..len], peer).await {
                    debug!("dns: send error: {:?}", e);
                }
            }
            Err(e) => debug!("dns: ignoring packet: {}", e),
        }
    }
}

/// Lease addresses on the access point network, naming the device as gateway
/// and DNS server.
#[embassy_executor::task]
pub async fn dhcp_task(stack: Stack<'static>, address: Ipv4Addr) {
    use edge_dhcp::io::{self, DEFAULT_SERVER_PORT};
    use edge_dhcp::server::{Server, ServerOptions};
    use edge_nal::UdpBind;
    use edge_nal_embassy::{Udp, UdpBuffers};

    let mut buf = [0u8; 1500];
    let mut gateways = [address];
    let dns = [address];

    let buffers = UdpBuffers::<2, 1024, 1024, 4>::new();
    let unbound = Udp::new(stack, &buffers);
    let mut socket = match unbound
        .bind(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            DEFAULT_SERVER_PORT,
        )))
        .await
    {
        Ok(socket) => socket,
        Err(e) => {
            error!("dhcp: bind failed: {:?}", e);
            return;
        }
    };
    info!("dhcp: serving leases on {}", address);

    let mut options = ServerOptions::new(address, Some(&mut gateways));
    options.dns = &dns;

    loop {
        if let Err(e) = io::server::run(
            &mut Server::<_, 64>::new_with_et(address),
            &options,
            &mut socket,
            &mut buf,
        )
        .await
        {
            warn!("dhcp: server error: {:?}", e);
        }
        Timer::after(Duration::from_millis(500)).await;
    }
}
