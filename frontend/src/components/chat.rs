use leptos::ev;
use leptos::html::Div;
use leptos::prelude::*;
use web_sys::{ScrollBehavior, ScrollIntoViewOptions};

use poke_chat::view::{self, BubbleView};

use crate::state::AppState;

/// Main chat area with header, transcript, typing indicator and input.
#[component]
pub fn ChatArea() -> impl IntoView {
    let state = expect_context::<AppState>();
    let end_of_messages = NodeRef::<Div>::new();

    // Keep the newest bubble in view whenever the transcript or typing flag changes.
    Effect::new(move |_| {
        state.messages.track();
        state.flags.track();
        if let Some(end) = end_of_messages.get() {
            let options = ScrollIntoViewOptions::new();
            options.set_behavior(ScrollBehavior::Smooth);
            end.scroll_into_view_with_scroll_into_view_options(&options);
        }
    });

    view! {
        <main class="chat-area">
            <div class="chat-header">
                <div class="avatar">"🌴"</div>
                <div class="chat-title">
                    <h1>"Poke AI"</h1>
                    <p>"AI Email Analyst"</p>
                </div>
                <button class="disconnect-btn" on:click=move |_| state.disconnect()>
                    "Disconnect"
                </button>
            </div>

            <div class="messages-container">
                {move || {
                    if state.messages.with(Vec::is_empty) {
                        view! {
                            <div class="empty-state">
                                <h3>"Welcome to Open Poke!"</h3>
                                <p>"Send me a message to get started!"</p>
                            </div>
                        }.into_any()
                    } else {
                        view! {
                            <For
                                each=move || state.messages.with(|msgs| view::bubbles(msgs, &chrono::Local))
                                key=|b| (b.id.clone(), b.status_icon)
                                let:bubble
                            >
                                <MessageBubble bubble=bubble />
                            </For>
                            <Show when=move || state.flags.with(view::show_typing)>
                                <TypingIndicator />
                            </Show>
                        }.into_any()
                    }
                }}
                <div node_ref=end_of_messages></div>
            </div>

            <ChatInput />
        </main>
    }
}

/// A single chat message bubble.
#[component]
fn MessageBubble(bubble: BubbleView) -> impl IntoView {
    let css_class = if bubble.from_user { "message user" } else { "message agent" };

    view! {
        <div class=css_class>
            <div class="message-content">{bubble.content}</div>
            <div class="message-meta">
                <span class="time">{bubble.time_label}</span>
                {bubble.status_icon.map(|icon| view! {
                    <span class=icon.css_class()>{icon.glyph()}</span>
                })}
            </div>
        </div>
    }
}

#[component]
fn TypingIndicator() -> impl IntoView {
    view! {
        <div class="message agent typing">
            <span class="dot"></span>
            <span class="dot"></span>
            <span class="dot"></span>
        </div>
    }
}

/// Chat input form with textarea and send button.
#[component]
fn ChatInput() -> impl IntoView {
    let state = expect_context::<AppState>();
    let (input, set_input) = signal(String::new());

    let is_disabled = move || state.flags.with(view::input_disabled);

    let send = move || {
        let text = input.get().trim().to_string();
        if text.is_empty() || is_disabled() {
            return;
        }
        set_input.set(String::new());
        state.send_message(text);
    };

    let on_keydown = move |ev: ev::KeyboardEvent| {
        if ev.key() == "Enter" && !ev.shift_key() {
            ev.prevent_default();
            send();
        }
    };

    view! {
        <div class="input-area">
            <div class="input-row">
                <textarea
                    rows="1"
                    placeholder="Ask Poke about your email patterns, contacts, or insights..."
                    prop:value=input
                    on:input=move |ev| {
                        set_input.set(event_target_value(&ev));
                    }
                    on:keydown=on_keydown
                    disabled=is_disabled
                />
                <button
                    class="send-btn"
                    on:click=move |_| send()
                    disabled=move || is_disabled() || input.get().trim().is_empty()
                >
                    "Send"
                </button>
            </div>
        </div>
    }
}
