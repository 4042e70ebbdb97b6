use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use mockup_contracts::events::{EventLog, MockupEvent};
use mockup_contracts::generation::{EncodedImage, GenerationFailure, GenerationResult};
use mockup_contracts::settings::{Credential, CredentialStore};

use crate::client::GenerationTransport;
use crate::encoder::{encode_image, ImageFile};
use crate::request::{build_request, GenerationOptions};
use crate::response::parse_response;
use crate::session::{GenerationStateMachine, SessionInputs, SessionSnapshot, Transition};

type Encoder = Box<dyn Fn(&ImageFile) -> Result<EncodedImage, GenerationFailure> + Send + Sync>;

// The machine lock covers applying a transition and notifying watchers. It is
// never held across the file read, the network call or the event log write.
pub struct MockupEngine<T: GenerationTransport> {
    transport: T,
    encode: Encoder,
    options: GenerationOptions,
    machine: Mutex<GenerationStateMachine>,
    credentials: Mutex<CredentialStore>,
    watchers: Mutex<Vec<Sender<SessionSnapshot>>>,
    events: Option<EventLog>,
}

impl<T: GenerationTransport> MockupEngine<T> {
    pub fn new(transport: T, credentials: CredentialStore) -> Self {
        Self {
            transport,
            encode: Box::new(encode_image),
            options: GenerationOptions::default(),
            machine: Mutex::new(GenerationStateMachine::new()),
            credentials: Mutex::new(credentials),
            watchers: Mutex::new(Vec::new()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    #[cfg(test)]
    fn with_encoder(
        mut self,
        encode: impl Fn(&ImageFile) -> Result<EncodedImage, GenerationFailure> + Send + Sync + 'static,
    ) -> Self {
        self.encode = Box::new(encode);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        lock(&self.machine).snapshot().clone()
    }

    pub fn current(&self) -> (SessionSnapshot, Option<SessionInputs>) {
        let machine = lock(&self.machine);
        (machine.snapshot().clone(), machine.inputs().cloned())
    }

    pub fn credential(&self) -> Option<Credential> {
        lock(&self.credentials).get().cloned()
    }

    pub fn set_credential(&self, key_value: &str) -> Option<String> {
        let (warning, credential) = {
            let mut store = lock(&self.credentials);
            let warning = store.set(key_value);
            (warning, store.get().cloned())
        };
        let fingerprint = credential
            .as_ref()
            .map(Credential::fingerprint)
            .unwrap_or_default();
        let persisted = credential
            .as_ref()
            .map(Credential::is_persisted)
            .unwrap_or(false);
        let event = match &warning {
            Some(message) => MockupEvent::CredentialWarning {
                fingerprint,
                persisted,
                warning: message.clone(),
            },
            None => MockupEvent::CredentialSaved {
                fingerprint,
                persisted,
            },
        };
        self.record(&event);
        warning
    }

    pub fn subscribe(&self) -> Receiver<SessionSnapshot> {
        let (tx, rx) = mpsc::channel();
        lock(&self.watchers).push(tx);
        rx
    }

    pub fn reset(&self) -> SessionSnapshot {
        let snapshot = {
            let mut machine = lock(&self.machine);
            let snapshot = machine.reset();
            self.notify(&snapshot);
            snapshot
        };
        self.record(&snapshot.to_event());
        snapshot
    }

    // The returned snapshot belongs to a newer session if this one was
    // superseded meanwhile.
    pub fn generate(&self, prompt: &str, image: Option<&ImageFile>) -> SessionSnapshot {
        let credential = self.credential();
        let (started, snapshot) = {
            let mut machine = lock(&self.machine);
            let started = machine.start(prompt, image, credential.as_ref());
            let snapshot = machine.snapshot().clone();
            self.notify(&snapshot);
            (started, snapshot)
        };
        self.record(&snapshot.to_event());
        let ticket = match started {
            Ok(ticket) => ticket,
            Err(snapshot) => return snapshot,
        };

        self.record(&MockupEvent::GenerationStarted {
            sequence: ticket.sequence,
            prompt_chars: ticket.inputs.prompt.chars().count(),
            image_path: ticket.inputs.image.path().to_string_lossy().to_string(),
            credential: ticket.credential.fingerprint(),
        });

        let encoded = (self.encode)(&ticket.inputs.image);
        if !self.transition(|machine| machine.encoded(ticket.sequence, &encoded)) {
            // Superseded while the file was being read.
            return self.snapshot();
        }
        let Ok(encoded) = encoded else {
            return self.snapshot();
        };

        let result = build_request(&ticket.inputs.prompt, &encoded, &self.options)
            .and_then(|request| self.transport.send(&request, &ticket.credential))
            .map(|raw| parse_response(&raw))
            .unwrap_or_else(GenerationResult::Failure);
        self.transition(|machine| machine.finished(ticket.sequence, result));
        self.snapshot()
    }

    fn transition(
        &self,
        apply: impl FnOnce(&mut GenerationStateMachine) -> Transition,
    ) -> bool {
        let (applied, event) = {
            let mut machine = lock(&self.machine);
            match apply(&mut *machine) {
                Transition::Applied(snapshot) => {
                    self.notify(&snapshot);
                    (true, snapshot.to_event())
                }
                Transition::Discarded { sequence, current } => (
                    false,
                    MockupEvent::GenerationDiscarded {
                        sequence,
                        current_sequence: current,
                    },
                ),
            }
        };
        self.record(&event);
        applied
    }

    fn notify(&self, snapshot: &SessionSnapshot) {
        lock(&self.watchers).retain(|watcher| watcher.send(snapshot.clone()).is_ok());
    }

    fn record(&self, event: &MockupEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(err) = events.record(event) {
            eprintln!(
                "mockup events: failed to write {} to {}: {err:#}",
                event.name(),
                events.path().display()
            );
        }
    }
}

pub fn spawn_generate<T: GenerationTransport + 'static>(
    engine: &Arc<MockupEngine<T>>,
    prompt: String,
    image: Option<ImageFile>,
) -> JoinHandle<SessionSnapshot> {
    let engine = Arc::clone(engine);
    thread::spawn(move || engine.generate(&prompt, image.as_ref()))
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
