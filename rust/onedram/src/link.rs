//! Pipes as `sipc` links.

use std::sync::Arc;

use sipc::{Format, Link, LinkCallback, LinkError, LinkRegistry, LinkState, RegistryError};

use crate::modem::ModemCtl;
use crate::pipe::PipeId;

/// One pipe of a OneDRAM endpoint, seen as a transport.
pub struct OneDramLink {
    modem: Arc<ModemCtl>,
    pipe: PipeId,
}

impl OneDramLink {
    pub fn new(modem: Arc<ModemCtl>, pipe: PipeId) -> Self {
        Self { modem, pipe }
    }

    pub fn pipe(&self) -> PipeId {
        self.pipe
    }
}

impl Link for OneDramLink {
    fn transmit(&self, frame: &[u8]) -> Result<(), LinkError> {
        self.modem
            .pipe_send(self.pipe, frame, None)
            .map_err(|err| {
                debug!(pipe = ?self.pipe, len = frame.len(), %err, "pipe send failed");
                LinkError::from(err)
            })
    }

    fn open(&self, channel: u32, format: Format) -> Result<(), LinkError> {
        trace!(pipe = ?self.pipe, channel, ?format, "channel opened");
        Ok(())
    }

    fn set_callback(&self, callback: Option<Arc<dyn LinkCallback>>) {
        self.modem.pipe(self.pipe).set_callback(callback);
    }

    fn state(&self) -> LinkState {
        self.modem.state().link_state()
    }
}

/// Bind every pipe of `modem` in `registry`.
///
/// The registry's receive callback is installed on each pipe as it is
/// bound; install it before calling this.
pub fn register_links(modem: &Arc<ModemCtl>, registry: &LinkRegistry) -> Result<(), RegistryError> {
    for pipe in [PipeId::Fmt, PipeId::Rfs, PipeId::Raw] {
        let link = Arc::new(OneDramLink::new(Arc::clone(modem), pipe));
        registry.set_link(pipe.format(), link)?;
        info!(pipe = ?pipe, "onedram pipe bound");
    }
    Ok(())
}
