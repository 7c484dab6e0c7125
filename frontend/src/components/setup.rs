use leptos::prelude::*;

use poke_chat::SetupStep;

use crate::state::AppState;

/// Name form, then the Gmail authorization screen when the backend asks for one.
#[component]
pub fn ConnectionSetupView() -> impl IntoView {
    let state = expect_context::<AppState>();

    move || match state.setup_step.get() {
        SetupStep::AwaitingAuthorization(attempt) => {
            view! { <AuthorizationPrompt redirect_url=attempt.redirect_url /> }.into_any()
        }
        SetupStep::Established { .. } => ().into_any(),
        SetupStep::CollectingInfo | SetupStep::Connecting => view! { <NameForm /> }.into_any(),
    }
}

#[component]
fn ErrorBanner() -> impl IntoView {
    let state = expect_context::<AppState>();
    move || {
        state
            .setup_error
            .get()
            .map(|err| view! { <div class="error-banner">{err}</div> })
    }
}

#[component]
fn NameForm() -> impl IntoView {
    let state = expect_context::<AppState>();
    let (name, set_name) = signal(String::new());

    let on_submit = move |ev: leptos::ev::SubmitEvent| {
        ev.prevent_default();
        let value = name.get();
        if value.trim().is_empty() || state.setup_busy.get_untracked() {
            return;
        }
        state.submit_name(value);
    };

    view! {
        <div class="setup-screen">
            <div class="setup-card">
                <h1>"Welcome to Poke AI"</h1>
                <p class="subtitle">
                    "Connect your Gmail to get started with AI-powered email analysis"
                </p>
                <form on:submit=on_submit>
                    <label for="name">"Full Name"</label>
                    <input
                        id="name"
                        type="text"
                        placeholder="Enter your full name"
                        required
                        prop:value=name
                        on:input=move |ev| set_name.set(event_target_value(&ev))
                    />
                    <ErrorBanner />
                    <button
                        type="submit"
                        class="primary-btn"
                        disabled=move || state.setup_busy.get() || name.get().trim().is_empty()
                    >
                        {move || if state.setup_busy.get() { "Connecting…" } else { "Connect Gmail" }}
                    </button>
                </form>
            </div>
        </div>
    }
}

#[component]
fn AuthorizationPrompt(redirect_url: Option<String>) -> impl IntoView {
    let state = expect_context::<AppState>();

    view! {
        <div class="setup-screen">
            <div class="setup-card">
                <h2>"Authorize Gmail Access"</h2>
                <p class="subtitle">
                    "Click the button below to authorize Poke AI to access your Gmail account."
                </p>
                {redirect_url.map(|url| view! {
                    <a class="primary-btn" href=url target="_blank" rel="noopener noreferrer">
                        "Authorize Gmail Access"
                    </a>
                })}
                <button
                    class="secondary-btn"
                    disabled=move || state.setup_busy.get()
                    on:click=move |_| state.confirm_authorization()
                >
                    "I've completed authorization"
                </button>
                <ErrorBanner />
            </div>
        </div>
    }
}
