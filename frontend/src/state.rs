use std::rc::Rc;

use leptos::prelude::*;
use leptos::task::spawn_local;

use poke_chat::{
    ClientConfig, ConnectionSetup, ConversationController, Message, SessionRepository,
    SetupProgress, SetupStep, UiFlags,
};

use crate::api::HttpGateway;
use crate::scheduler::BrowserScheduler;
use crate::storage::BrowserStore;

/// Shared application state, provided via Leptos context.
///
/// The controller and the setup flow own the real state; the signals here mirror it
/// for rendering and are only written from their callbacks.
#[derive(Clone, Copy)]
pub struct AppState {
    // --- Read signals (for components to subscribe to) ---
    pub user_id: ReadSignal<Option<String>>,
    pub messages: ReadSignal<Vec<Message>>,
    pub flags: ReadSignal<UiFlags>,
    pub setup_step: ReadSignal<SetupStep>,
    pub setup_error: ReadSignal<Option<String>>,
    pub setup_busy: ReadSignal<bool>,

    // --- Write signals for the setup mirror ---
    set_setup_step: WriteSignal<SetupStep>,
    set_setup_error: WriteSignal<Option<String>>,
    set_setup_busy: WriteSignal<bool>,

    controller: StoredValue<ConversationController, LocalStorage>,
    setup: StoredValue<Rc<ConnectionSetup>, LocalStorage>,
}

impl AppState {
    /// Create a new `AppState` and provide it in the current Leptos context.
    pub fn provide(config: ClientConfig) -> Self {
        let (user_id, set_user_id) = signal(None::<String>);
        let (messages, set_messages) = signal(Vec::<Message>::new());
        let (flags, set_flags) = signal(UiFlags::default());
        let (setup_step, set_setup_step) = signal(SetupStep::CollectingInfo);
        let (setup_error, set_setup_error) = signal(None::<String>);
        let (setup_busy, set_setup_busy) = signal(false);

        log::info!("Using backend at {}", config.api_base);
        let gateway = Rc::new(HttpGateway::new(config.api_base.clone()));
        let controller = ConversationController::new(
            gateway.clone(),
            Rc::new(BrowserScheduler),
            SessionRepository::new(Rc::new(BrowserStore)),
            config,
        );
        controller.set_listener(move |snapshot| {
            if user_id.get_untracked() != snapshot.user_id {
                set_user_id.set(snapshot.user_id.clone());
            }
            set_messages.set(snapshot.messages.clone());
            set_flags.set(snapshot.flags);
        });

        let state = Self {
            user_id,
            messages,
            flags,
            setup_step,
            setup_error,
            setup_busy,
            set_setup_step,
            set_setup_error,
            set_setup_busy,
            controller: StoredValue::new_local(controller),
            setup: StoredValue::new_local(Rc::new(ConnectionSetup::new(gateway))),
        };

        provide_context(state);
        state
    }

    /// Pick up the session left by a previous page load.
    pub fn restore(&self) {
        if let Some(user_id) = self.controller.with_value(|c| c.restore()) {
            log::info!("Resumed session for {user_id}");
        }
    }

    pub fn submit_name(&self, name: String) {
        let state = *self;
        let setup = self.setup.get_value();
        self.set_setup_busy.set(true);
        self.set_setup_error.set(None);
        self.set_setup_step.set(SetupStep::Connecting);

        spawn_local(async move {
            let result = setup.submit_name(&name).await;
            state.finish_setup_step(&setup, result);
        });
    }

    pub fn confirm_authorization(&self) {
        let state = *self;
        let setup = self.setup.get_value();
        self.set_setup_busy.set(true);

        spawn_local(async move {
            let result = setup.confirm_authorization().await;
            state.finish_setup_step(&setup, result);
        });
    }

    pub fn send_message(&self, text: String) {
        let controller = self.controller.get_value();
        spawn_local(async move {
            if let Err(e) = controller.send_message(&text).await {
                log::error!("Failed to send message: {e}");
            }
        });
    }

    pub fn disconnect(&self) {
        self.controller.with_value(|c| c.disconnect());
        self.setup.with_value(|s| s.reset());
        self.set_setup_step.set(SetupStep::CollectingInfo);
        self.set_setup_error.set(None);
    }

    fn finish_setup_step(
        &self,
        setup: &ConnectionSetup,
        result: Result<SetupProgress, poke_chat::AppError>,
    ) {
        self.set_setup_busy.set(false);
        self.set_setup_step.set(setup.step());
        self.set_setup_error.set(setup.error());
        match result {
            Ok(SetupProgress::Established { user_id }) => {
                self.controller.with_value(|c| c.establish(&user_id));
            }
            Ok(SetupProgress::AuthorizationRequired { redirect_url }) => {
                log::info!("Waiting for authorization at {redirect_url}");
            }
            Err(e) => log::error!("Connection setup failed: {e}"),
        }
    }
}
