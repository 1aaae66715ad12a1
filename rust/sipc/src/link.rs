//! Transport abstraction and the registry binding transports to formats.
//!
//! A [`Link`] moves framed bytes for one format over some physical medium
//! (a OneDRAM pipe, an HSIC endpoint, a test double). The multiplexer never
//! talks to a medium directly. It looks the link up in a [`LinkRegistry`]
//! that the application creates at startup and tears down at shutdown.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{DecodeError, LinkError, RegistryError};
use crate::format::{Format, PerFormat};

/// Whether a link can carry traffic right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Online,
    /// The peer is powered down, booting, or dumping.
    Offline,
    /// The peer reported a crash.
    Crashed,
}

/// Sink for inbound bytes, installed by the multiplexer.
pub trait LinkCallback: Send + Sync {
    /// Consume raw inbound bytes of `format`.
    ///
    /// An error tells the link that the stream is corrupt and whatever is
    /// still buffered should be discarded.
    fn receive(&self, data: &[u8], format: Format) -> Result<(), DecodeError>;
}

/// A concrete transport for one format.
pub trait Link: Send + Sync {
    /// Send one framed message.
    fn transmit(&self, frame: &[u8]) -> Result<(), LinkError>;

    /// Prepare `channel` of `format` for traffic.
    fn open(&self, channel: u32, format: Format) -> Result<(), LinkError>;

    /// Install or remove the inbound sink.
    fn set_callback(&self, callback: Option<Arc<dyn LinkCallback>>);

    fn state(&self) -> LinkState {
        LinkState::Online
    }
}

#[derive(Default)]
struct Bindings {
    links: PerFormat<Option<Arc<dyn Link>>>,
    callback: Option<Arc<dyn LinkCallback>>,
}

/// Format → link bindings plus the multiplexer's receive callback.
#[derive(Default)]
pub struct LinkRegistry {
    inner: RwLock<Bindings>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the receive callback that links bound from now on will use.
    pub fn install_callback(&self, callback: Arc<dyn LinkCallback>) {
        self.inner.write().callback = Some(callback);
    }

    pub fn has_callback(&self) -> bool {
        self.inner.read().callback.is_some()
    }

    /// Bind `link` as the transport for the format numbered `format`.
    pub fn set_link_raw(&self, format: u32, link: Arc<dyn Link>) -> Result<(), RegistryError> {
        let format = Format::from_u32(format).ok_or(RegistryError::InvalidFormat(format))?;
        self.set_link(format, link)
    }

    /// Bind `link` as the transport for `format`.
    ///
    /// Fails with `AlreadyBound` while another link serves the format and
    /// with `Deferred` until the receive callback is installed.
    pub fn set_link(&self, format: Format, link: Arc<dyn Link>) -> Result<(), RegistryError> {
        let callback = {
            let mut inner = self.inner.write();
            if inner.links[format].is_some() {
                return Err(RegistryError::AlreadyBound(format));
            }
            let Some(callback) = inner.callback.clone() else {
                debug!(?format, "link registration deferred");
                return Err(RegistryError::Deferred);
            };
            inner.links[format] = Some(link.clone());
            callback
        };
        link.set_callback(Some(callback));
        info!(?format, "link bound");
        Ok(())
    }

    /// Unbind the link serving `format`, if any.
    pub fn clear_link(&self, format: Format) -> Option<Arc<dyn Link>> {
        let link = self.inner.write().links[format].take()?;
        link.set_callback(None);
        info!(?format, "link cleared");
        Some(link)
    }

    pub fn link(&self, format: Format) -> Option<Arc<dyn Link>> {
        self.inner.read().links[format].clone()
    }

    /// Unbind every link and drop the callback.
    pub fn teardown(&self) {
        let links: Vec<Arc<dyn Link>> = {
            let mut inner = self.inner.write();
            inner.callback = None;
            Format::ALL
                .into_iter()
                .filter_map(|f| inner.links[f].take())
                .collect()
        };
        for link in links {
            link.set_callback(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct NullLink {
        callback: Mutex<Option<Arc<dyn LinkCallback>>>,
    }

    impl Link for NullLink {
        fn transmit(&self, _frame: &[u8]) -> Result<(), LinkError> {
            Ok(())
        }

        fn open(&self, _channel: u32, _format: Format) -> Result<(), LinkError> {
            Ok(())
        }

        fn set_callback(&self, callback: Option<Arc<dyn LinkCallback>>) {
            *self.callback.lock() = callback;
        }
    }

    struct Sink;

    impl LinkCallback for Sink {
        fn receive(&self, _data: &[u8], _format: Format) -> Result<(), DecodeError> {
            Ok(())
        }
    }

    #[test]
    fn registration_before_callback_is_deferred() {
        let registry = LinkRegistry::new();
        let link = Arc::new(NullLink::default());
        assert_eq!(
            registry.set_link(Format::Fmt, link.clone()),
            Err(RegistryError::Deferred)
        );
        assert!(registry.link(Format::Fmt).is_none());

        registry.install_callback(Arc::new(Sink));
        registry.set_link(Format::Fmt, link.clone()).unwrap();
        assert!(link.callback.lock().is_some());
    }

    #[test]
    fn second_link_for_a_format_is_refused() {
        let registry = LinkRegistry::new();
        registry.install_callback(Arc::new(Sink));
        registry
            .set_link(Format::Raw, Arc::new(NullLink::default()))
            .unwrap();
        assert_eq!(
            registry.set_link(Format::Raw, Arc::new(NullLink::default())),
            Err(RegistryError::AlreadyBound(Format::Raw))
        );

        let cleared = registry.clear_link(Format::Raw);
        assert!(cleared.is_some());
        registry
            .set_link(Format::Raw, Arc::new(NullLink::default()))
            .unwrap();
    }

    #[test]
    fn out_of_range_format_is_invalid() {
        let registry = LinkRegistry::new();
        assert_eq!(
            registry.set_link_raw(9, Arc::new(NullLink::default())),
            Err(RegistryError::InvalidFormat(9))
        );
    }

    #[test]
    fn teardown_detaches_callbacks() {
        let registry = LinkRegistry::new();
        registry.install_callback(Arc::new(Sink));
        let link = Arc::new(NullLink::default());
        registry.set_link(Format::Rfs, link.clone()).unwrap();

        registry.teardown();
        assert!(link.callback.lock().is_none());
        assert!(registry.link(Format::Rfs).is_none());
        assert!(!registry.has_callback());
    }
}
