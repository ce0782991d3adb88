use crate::error::{Error, Result};
use crate::rcon::packet::{
    Packet, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND,
    SERVERDATA_RESPONSE_VALUE,
};
use tokio::net::{TcpStream, ToSocketAddrs};

/// An authenticated RCON connection to a Source dedicated server.
///
/// # Example
///
/// ```no_run
/// use srcds_controller::rcon::RconClient;
///
/// # async fn demo() -> srcds_controller::Result<()> {
/// let mut client = RconClient::connect("127.0.0.1:27015", "hunter2").await?;
/// let hostname = client.exec("hostname").await?;
/// println!("{}", hostname);
/// # Ok(())
/// # }
/// ```
pub struct RconClient {
    stream: TcpStream,
    next_id: i32,
}

impl RconClient {
    /// Connects and authenticates.
    ///
    /// The caller bounds the whole exchange with its own timeout.
    pub async fn connect(addr: impl ToSocketAddrs, password: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Rcon(format!("connect failed: {}", e)))?;
        let mut client = Self { stream, next_id: 1 };
        client.authenticate(password).await?;
        Ok(client)
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    async fn authenticate(&mut self, password: &str) -> Result<()> {
        let id = self.allocate_id();
        Packet::new(id, SERVERDATA_AUTH, password)
            .write_to(&mut self.stream)
            .await?;

        // Servers send an empty RESPONSE_VALUE ahead of the AUTH_RESPONSE.
        loop {
            let packet = Packet::read_from(&mut self.stream).await?;
            if packet.kind != SERVERDATA_AUTH_RESPONSE {
                continue;
            }
            if packet.id == -1 {
                return Err(Error::Rcon("authentication failed".to_string()));
            }
            if packet.id != id {
                return Err(Error::Rcon(format!(
                    "unexpected auth response id {} (expected {})",
                    packet.id, id
                )));
            }
            tracing::trace!("RCON authentication accepted");
            return Ok(());
        }
    }

    /// Executes a console command and returns its (possibly multi-packet) output.
    pub async fn exec(&mut self, command: &str) -> Result<String> {
        let id = self.allocate_id();
        let marker = self.allocate_id();
        Packet::new(id, SERVERDATA_EXECCOMMAND, command)
            .write_to(&mut self.stream)
            .await?;
        // An empty RESPONSE_VALUE is mirrored back after the command output,
        // which marks the end of a split response.
        Packet::new(marker, SERVERDATA_RESPONSE_VALUE, "")
            .write_to(&mut self.stream)
            .await?;

        let mut output = String::new();
        loop {
            let packet = Packet::read_from(&mut self.stream).await?;
            if packet.id == marker {
                return Ok(output);
            }
            if packet.id == id && packet.kind == SERVERDATA_RESPONSE_VALUE {
                output.push_str(&packet.body);
            }
        }
    }
}
