use rustie_mqtt_codec::{Connect, MqttError, Packet, PacketHandler};
use tokio::net::TcpStream;
use tracing::{error, info, warn};

/// Connects to a broker, reports the CONNACK, pings once and disconnects.
#[tokio::main]
async fn main() -> Result<(), MqttError> {
    tracing_subscriber::fmt().init();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "127.0.0.1:1883".to_string());
    let client_id = args.next().unwrap_or_else(|| "rustie-probe".to_string());

    let stream = TcpStream::connect(&address).await?;
    info!("Connected to {}", address);
    let mut handler = PacketHandler::new(stream);

    handler
        .send(&mut Packet::Connect(Connect::new(client_id.as_str())))
        .await?;
    match handler.receive().await? {
        Packet::ConnAck(connack) if connack.accepted() => {
            info!("Connection accepted as {} (session present: {})", client_id, connack.session_present);
        }
        Packet::ConnAck(connack) => {
            error!(
                "Connection refused: {}",
                connack.error_message().unwrap_or("unknown return code")
            );
            handler.close().await?;
            return Ok(());
        }
        other => {
            warn!("Expected CONNACK, got {:?}", other.packet_type());
            handler.close().await?;
            return Ok(());
        }
    }

    handler.send(&mut Packet::PingReq).await?;
    match handler.receive().await? {
        Packet::PingResp => info!("Broker answered PINGREQ"),
        other => warn!("Expected PINGRESP, got {:?}", other.packet_type()),
    }

    handler.send(&mut Packet::Disconnect).await?;
    handler.close().await?;
    info!("Disconnected");
    Ok(())
}
