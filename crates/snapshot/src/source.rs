use std::io;

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// A readable byte stream with a known length.
pub type SizedStream = (u64, Box<dyn AsyncRead + Send + Unpin>);

/// The strongly consistent key-value store inside a cluster.
///
/// Export produces a point-in-time image at the store's current commit;
/// restore replays such an image. Both ends are black boxes to the plane.
#[async_trait]
pub trait SourceKv: Send + Sync {
    async fn export(&self) -> io::Result<SizedStream>;

    async fn restore(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> io::Result<()>;
}

/// Attached volume data, archived into a single stream.
#[async_trait]
pub trait VolumeSource: Send + Sync {
    async fn archive(&self) -> io::Result<SizedStream>;
}

/// The destination a volume archive unpacks into.
#[async_trait]
pub trait VolumeSink: Send + Sync {
    async fn unpack(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> io::Result<()>;
}
