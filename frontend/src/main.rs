mod api;
mod components;
mod scheduler;
mod state;
mod storage;

use leptos::mount::mount_to_body;
use leptos::prelude::*;

use poke_chat::ClientConfig;

use components::chat::ChatArea;
use components::setup::ConnectionSetupView;
use state::AppState;

/// Settings baked in at build time, e.g. `POKE_API_BASE=https://… trunk build`.
fn build_config() -> ClientConfig {
    ClientConfig::from_lookup(|key| {
        let value = match key {
            "POKE_API_BASE" => option_env!("POKE_API_BASE"),
            "POKE_POLL_INTERVAL_MS" => option_env!("POKE_POLL_INTERVAL_MS"),
            "POKE_CONVERSATION_POLL_ATTEMPTS" => option_env!("POKE_CONVERSATION_POLL_ATTEMPTS"),
            "POKE_MESSAGE_POLL_ATTEMPTS" => option_env!("POKE_MESSAGE_POLL_ATTEMPTS"),
            _ => None,
        };
        value.map(str::to_string)
    })
}

/// Root application component.
#[component]
fn App() -> impl IntoView {
    let state = AppState::provide(build_config());

    // Resume a stored session before the first render
    state.restore();

    view! {
        <div class="app-container">
            {move || {
                if state.user_id.with(Option::is_some) {
                    view! { <ChatArea /> }.into_any()
                } else {
                    view! { <ConnectionSetupView /> }.into_any()
                }
            }}
        </div>
    }
}

fn main() {
    console_log::init_with_level(log::Level::Debug).expect("Failed to init logger");
    mount_to_body(App);
}
