use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, TransportError};
use crate::pool::BackendPool;
use crate::providers::{RawCompletion, Transport, TransportFactory};
use crate::request::PromptPair;
use crate::BackendDescriptor;

/// The current backend together with its connection, handed out by
/// `BackendRegistry::current`.
#[derive(Clone)]
pub struct Lease
{   pub descriptor: BackendDescriptor
  , pub transport: Result<Arc<dyn Transport>, TransportError>
}

impl Lease
{   pub fn id(&self) -> &str
    {   &self.descriptor.id
    }

    /// Dispatch over the leased connection. A connection that could not
    /// be built fails here with its own classification.
    pub async fn dispatch(
      &self
    , prompt: &PromptPair
    ) -> Result<RawCompletion, TransportError>
    {   match &self.transport
        {   Ok(transport) => transport.dispatch(prompt).await
          , Err(e) => Err(e.clone())
        }
    }
}

impl std::fmt::Debug for Lease
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {   f.debug_struct("Lease")
          .field("descriptor", &self.descriptor)
          .field("connected", &self.transport.is_ok())
          .finish()
    }
}

struct RotateArgs
{   observed: String
  , reason: String
  , reply: oneshot::Sender<BackendDescriptor>
}

/// Union of all registry commands
enum RegistryCommand
{   Current(oneshot::Sender<Lease>)
  , Rotate(RotateArgs)
  , Snapshot(oneshot::Sender<Vec<BackendDescriptor>>)
  , Rotations(oneshot::Sender<u64>)
  , Shutdown(oneshot::Sender<()>)
}

/// State owned by the registry task
struct RegistryState
{   pool: BackendPool
  , factory: Arc<dyn TransportFactory>
  , cached: Option<Arc<dyn Transport>>
  , rotations: u64
}

impl RegistryState
{   fn lease(&mut self) -> Lease
    {   let descriptor = self.pool.current().clone();
        if let Some(transport) = &self.cached
        {   return Lease
            {   descriptor
              , transport: Ok(transport.clone())
            };
        }
        debug!("Connecting transport for {}", descriptor.id);
        let transport = self.factory.connect(&descriptor);
        match &transport
        {   Ok(t) => self.cached = Some(t.clone())
          , Err(e) => warn!("Could not connect to {}: {}", descriptor.id, e)
        }
        Lease { descriptor, transport }
    }

    fn rotate_from(&mut self, observed: &str, reason: &str) -> BackendDescriptor
    {   if self.pool.rotate_if_current(observed, reason)
        {   self.cached = None;
            self.rotations += 1;
        }
        self.pool.current().clone()
    }
}

/// Shared handle to the task that owns the backend pool. Cloning the
/// handle shares the same pool.
#[derive(Clone)]
pub struct BackendRegistry
{   commands_tx: mpsc::UnboundedSender<RegistryCommand>
  , size: usize
}

impl BackendRegistry
{   /// Spawn the registry task. Must be called inside a tokio runtime.
    pub fn new(
      backends: Vec<BackendDescriptor>
    , factory: Arc<dyn TransportFactory>
    ) -> Result<Self, Error>
    {   let pool = BackendPool::new(backends)?;
        let size = pool.len();
        debug!("Creating BackendRegistry over {} backends", size);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let state = RegistryState
        {   pool
          , factory
          , cached: None
          , rotations: 0
        };
        tokio::spawn(async move {
          run_registry_loop(commands_rx, state).await
        });

        Ok(BackendRegistry { commands_tx, size })
    }

    /// Number of backends in the pool
    pub fn len(&self) -> usize
    {   self.size
    }

    pub fn is_empty(&self) -> bool
    {   self.size == 0
    }

    /// The current backend and its cached connection
    pub async fn current(&self) -> Result<Lease, Error>
    {   let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Current(reply))?;
        rx.await.map_err(|_| Error::RegistryClosed)
    }

    /// Rotate away from `observed` if it is still current and return
    /// the backend that is current afterwards.
    pub async fn rotate_from(
      &self
    , observed: &str
    , reason: &str
    ) -> Result<BackendDescriptor, Error>
    {   let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Rotate(RotateArgs
        {   observed: observed.to_string()
          , reason: reason.to_string()
          , reply
        }))?;
        rx.await.map_err(|_| Error::RegistryClosed)
    }

    /// Current ordering, front first
    pub async fn snapshot(&self) -> Result<Vec<BackendDescriptor>, Error>
    {   let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Snapshot(reply))?;
        rx.await.map_err(|_| Error::RegistryClosed)
    }

    /// Rotations performed since the registry started
    pub async fn rotations(&self) -> Result<u64, Error>
    {   let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Rotations(reply))?;
        rx.await.map_err(|_| Error::RegistryClosed)
    }

    /// Stop the registry task. Other handles get `RegistryClosed` after.
    pub async fn shutdown(&self) -> Result<(), Error>
    {   debug!("Shutting down BackendRegistry");
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Shutdown(reply))?;
        rx.await.map_err(|_| Error::RegistryClosed)
    }

    fn send(&self, cmd: RegistryCommand) -> Result<(), Error>
    {   self.commands_tx.send(cmd).map_err(|_| {
          error!("Registry channel closed");
          Error::RegistryClosed
        })
    }
}

/// Main registry loop. Each command is handled to completion before
/// the next one, so rotations are never lost or doubled.
async fn run_registry_loop(
  mut commands_rx: mpsc::UnboundedReceiver<RegistryCommand>
, mut state: RegistryState
)
{   debug!("Starting BackendRegistry loop");
    while let Some(cmd) = commands_rx.recv().await
    {   match cmd
        {   RegistryCommand::Current(reply) => {
              let _ = reply.send(state.lease());
            }
          , RegistryCommand::Rotate(args) => {
              let next = state.rotate_from(&args.observed, &args.reason);
              let _ = args.reply.send(next);
            }
          , RegistryCommand::Snapshot(reply) => {
              let _ = reply.send(state.pool.snapshot());
            }
          , RegistryCommand::Rotations(reply) => {
              let _ = reply.send(state.rotations);
            }
          , RegistryCommand::Shutdown(reply) => {
              let _ = reply.send(());
              info!("BackendRegistry shutting down");
              break;
            }
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use crate::error::ErrorCategory;

    struct Echo(String);

    #[async_trait]
    impl Transport for Echo
    {   async fn dispatch(
          &self
        , _prompt: &PromptPair
        ) -> Result<RawCompletion, TransportError>
        {   Ok(RawCompletion::text(self.0.clone()))
        }
    }

    #[derive(Default)]
    struct CountingFactory
    {   connects: AtomicUsize
    }

    impl TransportFactory for CountingFactory
    {   fn connect(
          &self
        , backend: &BackendDescriptor
        ) -> Result<Arc<dyn Transport>, TransportError>
        {   self.connects.fetch_add(1, Ordering::SeqCst);
            if backend.id == "broken"
            {   return Err(TransportError::new(
                  ErrorCategory::Unauthorized, "no key"
                ));
            }
            Ok(Arc::new(Echo(backend.id.clone())))
        }
    }

    fn backends(ids: &[&str]) -> Vec<BackendDescriptor>
    {   ids.iter().map(|id| BackendDescriptor::new(*id)).collect()
    }

    fn prompt() -> PromptPair
    {   PromptPair
        {   system: String::new()
          , task: String::new()
        }
    }

    #[tokio::test]
    async fn transport_is_cached_until_rotation()
    {   let factory = Arc::new(CountingFactory::default());
        let registry = BackendRegistry::new(
          backends(&["a", "b"]), factory.clone()
        ).unwrap();

        let first = registry.current().await.unwrap();
        let again = registry.current().await.unwrap();
        assert_eq!(first.id(), "a");
        assert_eq!(again.id(), "a");
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);

        let next = registry.rotate_from("a", "quota").await.unwrap();
        assert_eq!(next.id, "b");
        let lease = registry.current().await.unwrap();
        assert_eq!(lease.dispatch(&prompt()).await.unwrap().text, "b");
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_rotations_from_the_same_backend_count_once()
    {   let registry = BackendRegistry::new(
          backends(&["a", "b", "c"]),
          Arc::new(CountingFactory::default())
        ).unwrap();

        let mut handles = vec![];
        for _ in 0..8
        {   let r = registry.clone();
            handles.push(tokio::spawn(async move {
              r.rotate_from("a", "rate limit").await
            }));
        }
        for h in handles
        {   assert_eq!(h.await.unwrap().unwrap().id, "b");
        }
        assert_eq!(registry.rotations().await.unwrap(), 1);
        let order: Vec<String> = registry.snapshot().await.unwrap()
          .into_iter().map(|b| b.id).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn connect_failure_surfaces_on_dispatch()
    {   let registry = BackendRegistry::new(
          backends(&["broken", "ok"]),
          Arc::new(CountingFactory::default())
        ).unwrap();
        let lease = registry.current().await.unwrap();
        let err = lease.dispatch(&prompt()).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Unauthorized);
    }

    #[tokio::test]
    async fn shutdown_closes_every_handle()
    {   let registry = BackendRegistry::new(
          backends(&["a"]),
          Arc::new(CountingFactory::default())
        ).unwrap();
        let other = registry.clone();
        registry.shutdown().await.unwrap();
        assert_eq!(other.current().await.unwrap_err(), Error::RegistryClosed);
    }

    #[test]
    fn empty_registry_is_rejected()
    {   tokio_test::block_on(async {
          let result = BackendRegistry::new(
            vec![],
            Arc::new(CountingFactory::default())
          );
          assert_eq!(result.err(), Some(Error::EmptyPool));
        });
    }
}
