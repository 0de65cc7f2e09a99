mod activity;
mod api;
mod auth;
mod config;
mod controller;
mod markdown;
mod notification;
mod sources;

use iced::{
    widget::{
        button, column, container, mouse_area, rich_text, row, scrollable, span, stack, text,
        text_input, text_input::Id, Column, Space,
    },
    alignment, clipboard, font, time, window, Background, Border, Color, Element, Font, Length,
    Padding, Size, Subscription, Task, Theme,
};
use std::time::{Duration, Instant};

use api::{BackendClient, QueryResponse};
use auth::{AuthState, AuthView, ButtonStyle, Pending, PrimaryAction};
use controller::{AnswerView, FollowupAction, Outcome, QueryController, Ticket};
use markdown::{Block, HeadingLevel};
use notification::{Kind as Toast, Notifications};

const BOLD: Font = Font {
    weight: font::Weight::Bold,
    ..Font::MONOSPACE
};

const MUTED: Color = Color { r: 0.58, g: 0.64, b: 0.72, a: 1.0 };
const DANGER: Color = Color { r: 0.94, g: 0.27, b: 0.27, a: 1.0 };
const ONLINE: Color = Color { r: 0.06, g: 0.73, b: 0.51, a: 1.0 };

const LOGIN_PACING: Duration = Duration::from_millis(1000);
const LOGOUT_PACING: Duration = Duration::from_millis(800);

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const EXAMPLES: [(&str, Option<u32>); 4] = [
    ("What meetings do I have this week?", None),
    ("Summarize the unread emails from today", Some(20)),
    ("Find invoices and receipts from last month", Some(30)),
    ("Any replies about my job applications?", Some(50)),
];

fn main() -> iced::Result {
    let config = config::Config::load();

    let client = match BackendClient::with_config(
        config.backend.base_url.clone(),
        Duration::from_secs(config.backend.timeout_secs),
    ) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to create backend client: {:#}", e);
            std::process::exit(1);
        }
    };

    let window_settings = window::Settings {
        size: Size::new(config.window.width as f32, config.window.height as f32),
        min_size: Some(Size::new(config.window.min_width as f32, config.window.min_height as f32)),
        position: window::Position::Centered,
        ..Default::default()
    };

    iced::application("Mail Oracle", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window_settings)
        .default_font(Font::MONOSPACE)
        .run_with(move || App::new(config, client))
}

#[derive(Debug, Clone)]
enum Message {
    InputChanged(String),
    CountChanged(String),
    IncreaseCount,
    DecreaseCount,
    Submit,
    QueryReplied(u64, Instant, Result<QueryResponse, String>),
    QueryPaced(u64, Instant, Outcome),
    Followup(FollowupAction),
    AuthChecked(Result<AuthState, String>),
    PrimaryActionPressed,
    Login,
    LoginFinished(Result<AuthState, String>),
    LogoutFinished(Result<bool, String>),
    Example(usize),
    OpenSource(usize),
    DismissToast(u64),
    CopyAnswer,
    CopyAnswerHtml,
    Tick(Instant),
}

struct App {
    client: BackendClient,
    input_text: String,
    count_text: String,
    input_id: Id,
    controller: QueryController,
    auth: AuthState,
    auth_pending: Option<Pending>,
    notifications: Notifications,
    shake_started: Option<Instant>,
    show_activity: bool,
    loading_frame: usize,
    now: Instant,
}

impl App {
    fn new(config: config::Config, client: BackendClient) -> (Self, Task<Message>) {
        let input_id = Id::unique();
        activity::log(format!("Page loaded, backend at {}", client.base_url()));

        let app = App {
            client: client.clone(),
            input_text: String::new(),
            count_text: config.query.default_max_results.to_string(),
            input_id: input_id.clone(),
            controller: QueryController::new(),
            auth: AuthState::signed_out(),
            auth_pending: None,
            notifications: Notifications::new(config.notifications.desktop),
            shake_started: None,
            show_activity: config.ui.show_activity,
            loading_frame: 0,
            now: Instant::now(),
        };

        let status_task = Task::perform(
            async move { client.auth_status().await.map_err(|e| format!("{:#}", e)) },
            Message::AuthChecked,
        );

        (app, Task::batch([text_input::focus(input_id), status_task]))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        self.now = Instant::now();

        match message {
            Message::InputChanged(value) => {
                self.input_text = value;
                Task::none()
            }
            Message::CountChanged(value) => {
                self.count_text = value;
                Task::none()
            }
            Message::IncreaseCount => {
                self.count_text = controller::increase_count(&self.count_text).to_string();
                Task::none()
            }
            Message::DecreaseCount => {
                self.count_text = controller::decrease_count(&self.count_text).to_string();
                Task::none()
            }
            Message::Submit => self.submit(),
            Message::QueryReplied(token, started, result) => match result {
                Ok(response) => {
                    activity::log_with(
                        activity::Kind::Api,
                        format!("Backend response received in {}ms", self.now.saturating_duration_since(started).as_millis()),
                    );
                    if !self.controller.received(token) {
                        return Task::none();
                    }
                    Task::future(async move {
                        tokio::time::sleep(controller::ANALYZE_PACING).await;
                        Message::QueryPaced(token, started, Outcome::Replied(response))
                    })
                }
                Err(description) => {
                    let followups = self.controller.apply(token, started, Outcome::Transport(description), self.now);
                    schedule(followups)
                }
            },
            Message::QueryPaced(token, started, outcome) => {
                let followups = self.controller.apply(token, started, outcome, self.now);
                schedule(followups)
            }
            Message::Followup(action) => {
                self.controller.follow_up(action, self.now);
                Task::none()
            }
            Message::AuthChecked(result) => {
                self.auth = match result {
                    Ok(state) => state,
                    Err(e) => {
                        activity::log_with(activity::Kind::Error, format!("Auth status check failed: {}", e));
                        AuthState::signed_out()
                    }
                };
                Task::none()
            }
            Message::PrimaryActionPressed => {
                if self.auth_pending.is_some() {
                    return Task::none();
                }
                match self.auth.primary_action() {
                    PrimaryAction::Login => self.start_login(),
                    PrimaryAction::Logout => self.start_logout(),
                }
            }
            Message::Login => {
                if self.auth_pending.is_some() {
                    return Task::none();
                }
                self.start_login()
            }
            Message::LoginFinished(result) => {
                self.auth_pending = None;
                match &result {
                    Ok(state) if state.authenticated => {
                        activity::log_with(activity::Kind::Success, "Gmail authentication successful")
                    }
                    Ok(_) => activity::log_with(activity::Kind::Error, "Gmail authentication failed"),
                    Err(e) => activity::log_with(activity::Kind::Error, format!("Gmail authentication error: {}", e)),
                }
                let settled = auth::settle_login(result);
                self.settle(settled);
                Task::none()
            }
            Message::LogoutFinished(result) => {
                self.auth_pending = None;
                if let Err(e) = &result {
                    activity::log_with(activity::Kind::Error, format!("Logout error: {}", e));
                }
                let settled = auth::settle_logout(&self.auth, result);
                if settled.succeeded {
                    activity::log_with(activity::Kind::Auth, "Logged out, results hidden");
                    self.controller.hide_results();
                }
                self.settle(settled);
                Task::none()
            }
            Message::Example(index) => {
                let Some((query, count)) = EXAMPLES.get(index).copied() else {
                    return Task::none();
                };
                activity::log(format!("Setting query: \"{}\"", query));
                self.input_text = query.to_string();
                if let Some(count) = count {
                    self.count_text = count.to_string();
                }
                let restore = schedule(vec![self.controller.flash_query_set()]);
                Task::batch([text_input::focus(self.input_id.clone()), restore])
            }
            Message::OpenSource(index) => {
                if let Some((panel, _)) = self.controller.sources(self.now) {
                    if let Some(entry) = panel.entries.get(index) {
                        if let Err(e) = sources::open_in_gmail(entry) {
                            activity::log_with(activity::Kind::Error, format!("{:#}", e));
                        }
                    }
                }
                Task::none()
            }
            Message::DismissToast(id) => {
                self.notifications.dismiss(id);
                Task::none()
            }
            Message::CopyAnswer => match self.controller.answer() {
                Some(AnswerView::Answer { raw: Some(raw), .. }) => {
                    let raw = raw.clone();
                    self.toast("Answer copied to clipboard.", Toast::Info);
                    clipboard::write(raw)
                }
                _ => Task::none(),
            },
            Message::CopyAnswerHtml => match self.controller.answer() {
                Some(answer) => {
                    let html = answer.to_html();
                    self.toast("Answer HTML copied to clipboard.", Toast::Info);
                    clipboard::write(html)
                }
                None => Task::none(),
            },
            Message::Tick(now) => {
                self.now = now;
                self.notifications.tick(now);
                if self.shake_started.is_some_and(|s| controller::shake_offset(now.saturating_duration_since(s)).is_none()) {
                    self.shake_started = None;
                }
                if self.controller.is_busy() {
                    self.loading_frame = (self.loading_frame + 1) % SPINNER.len();
                }
                Task::none()
            }
        }
    }

    fn submit(&mut self) -> Task<Message> {
        let count = controller::parse_email_count(&self.count_text);
        let ticket = match self.controller.submit(&self.input_text, count, self.now) {
            Ok(ticket) => ticket,
            Err(_) => {
                self.shake_started = Some(self.now);
                return Task::none();
            }
        };

        let Ticket { token, request, started } = ticket;
        let client = self.client.clone();
        Task::perform(
            async move { client.query(&request).await.map_err(|e| format!("{:#}", e)) },
            move |result| Message::QueryReplied(token, started, result),
        )
    }

    fn start_login(&mut self) -> Task<Message> {
        self.auth_pending = Some(Pending::Login);
        activity::log_with(activity::Kind::Auth, "Starting Gmail authentication");
        let client = self.client.clone();
        Task::future(async move {
            // Only a backend reply is paced; transport errors settle at once.
            let result = client.login().await.map_err(|e| format!("{:#}", e));
            if result.is_ok() {
                tokio::time::sleep(LOGIN_PACING).await;
            }
            Message::LoginFinished(result)
        })
    }

    fn start_logout(&mut self) -> Task<Message> {
        self.auth_pending = Some(Pending::Logout);
        activity::log_with(activity::Kind::Auth, "Logging out of Gmail");
        let client = self.client.clone();
        Task::future(async move {
            let result = client.logout().await.map_err(|e| format!("{:#}", e));
            if result.is_ok() {
                tokio::time::sleep(LOGOUT_PACING).await;
            }
            Message::LogoutFinished(result)
        })
    }

    fn settle(&mut self, settled: auth::Settled) {
        let kind = if settled.succeeded { Toast::Success } else { Toast::Error };
        self.auth = settled.state;
        self.toast(settled.message, kind);
    }

    fn toast(&mut self, message: &str, kind: Toast) {
        self.notifications.notify(message, kind, self.now);
    }

    fn is_animating(&self) -> bool {
        let sources_revealing = self
            .controller
            .sources(self.now)
            .and_then(|(panel, shown_for)| panel.entries.last().map(|e| !e.is_revealed(shown_for)))
            .unwrap_or(false);

        self.controller.is_busy()
            || !self.notifications.is_empty()
            || self.shake_started.is_some()
            || sources_revealing
    }

    fn subscription(&self) -> Subscription<Message> {
        if self.is_animating() {
            time::every(Duration::from_millis(50)).map(Message::Tick)
        } else {
            Subscription::none()
        }
    }

    fn view(&self) -> Element<Message> {
        let mut content = column![self.view_auth(), self.view_query()]
            .spacing(16)
            .padding(20);

        if let Some(answer) = self.controller.answer() {
            content = content.push(view_answer(answer));
        }

        if let Some((panel, shown_for)) = self.controller.sources(self.now) {
            content = content.push(view_sources(panel, shown_for));
        }

        let mut page = column![scrollable(content).height(Length::Fill)];
        if self.show_activity {
            let lines = activity::recent(3)
                .into_iter()
                .fold(Column::new().spacing(2), |col, entry| {
                    col.push(text(entry.line()).size(11).color(MUTED))
                });
            page = page.push(container(lines).padding(Padding::from([6, 20])));
        }

        let toasts = self
            .notifications
            .iter()
            .fold(Column::new().spacing(8), |col, n| {
                let opacity = n.opacity(self.now);
                let background = Color { a: opacity, ..n.kind.color() };
                let foreground = Color { a: opacity, ..Color::WHITE };
                let toast = container(text(n.message.clone()).size(14).color(foreground))
                    .padding([12, 20])
                    .style(move |_theme: &Theme| container::Style {
                        background: Some(Background::Color(background)),
                        border: Border { radius: 8.0.into(), ..Default::default() },
                        ..Default::default()
                    });
                // slides in from the right edge
                let slide = (1.0 - opacity) * 40.0;
                col.push(
                    container(mouse_area(toast).on_press(Message::DismissToast(n.id)))
                        .padding(Padding { left: slide, ..Padding::ZERO }),
                )
            });

        let overlay = container(toasts)
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Right)
            .padding(20);

        stack![page, overlay].into()
    }

    fn view_auth(&self) -> Element<Message> {
        let view = AuthView::render(&self.auth).with_pending(self.auth_pending);

        let indicator = text("●").color(if view.indicator_on { ONLINE } else { MUTED });
        let style: fn(&Theme, button::Status) -> button::Style = match view.button_style {
            ButtonStyle::Primary => button::primary,
            ButtonStyle::Destructive => button::danger,
        };
        let auth_button = button(text(view.button_label).size(14))
            .style(style)
            .padding([8, 16])
            .on_press_maybe((!view.busy).then_some(Message::PrimaryActionPressed));

        row![
            text("Mail Oracle").size(22).font(BOLD),
            Space::with_width(Length::Fill),
            column![
                row![indicator, text(view.status_text).size(14)].spacing(6),
                text(view.identity).size(12).color(MUTED),
            ]
            .align_x(alignment::Horizontal::Right),
            auth_button,
        ]
        .spacing(12)
        .align_y(alignment::Vertical::Center)
        .into()
    }

    fn view_query(&self) -> Element<Message> {
        let input = text_input("Ask anything about your email...", &self.input_text)
            .on_input(Message::InputChanged)
            .on_submit(Message::Submit)
            .padding(15)
            .size(16)
            .id(self.input_id.clone());

        let offset = self
            .shake_started
            .and_then(|s| controller::shake_offset(self.now.saturating_duration_since(s)))
            .unwrap_or(0.0);
        let shaken = container(input).padding(Padding {
            left: 4.0 + offset,
            right: 4.0 - offset,
            ..Padding::ZERO
        });

        let label = if self.controller.is_busy() {
            format!("{} {}", SPINNER[self.loading_frame], self.controller.label())
        } else {
            self.controller.label()
        };
        let search = button(text(label).size(14))
            .style(button::primary)
            .padding([10, 18])
            .on_press_maybe((!self.controller.is_busy()).then_some(Message::Submit));

        let counter = row![
            text("Emails to analyze:").size(13).color(MUTED),
            button(text("-").size(14)).on_press(Message::DecreaseCount).style(button::secondary),
            text_input("10", &self.count_text)
                .on_input(Message::CountChanged)
                .width(Length::Fixed(56.0))
                .size(14),
            button(text("+").size(14)).on_press(Message::IncreaseCount).style(button::secondary),
            Space::with_width(Length::Fill),
            search,
        ]
        .spacing(8)
        .align_y(alignment::Vertical::Center);

        let examples = EXAMPLES.iter().enumerate().fold(
            row![text("Try:").size(12).color(MUTED)].spacing(8).align_y(alignment::Vertical::Center),
            |r, (i, (query, _))| {
                r.push(
                    button(text(*query).size(12))
                        .style(button::text)
                        .on_press(Message::Example(i)),
                )
            },
        );

        column![shaken, counter, scrollable(examples).direction(scrollable::Direction::Horizontal(
            scrollable::Scrollbar::new().width(2).scroller_width(2)
        ))]
        .spacing(10)
        .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn schedule(followups: Vec<controller::Followup>) -> Task<Message> {
    Task::batch(followups.into_iter().map(|f| {
        Task::future(async move {
            tokio::time::sleep(f.after).await;
            Message::Followup(f.action)
        })
    }))
}

fn render_spans(spans: &[markdown::Span], size: u16) -> Element<'static, Message> {
    let pieces: Vec<text::Span<'static, Message, Font>> = spans
        .iter()
        .map(|s| match s {
            markdown::Span::Text(t) => span(t.clone()).size(size),
            markdown::Span::Bold(t) => span(t.clone()).size(size).font(BOLD),
        })
        .collect();
    rich_text(pieces).into()
}

fn render_markdown(doc: &markdown::Document) -> Element<'static, Message> {
    if doc.is_empty() {
        return text(markdown::EMPTY_ANSWER).size(15).into();
    }

    doc.blocks
        .iter()
        .fold(Column::new().spacing(10), |col, block| match block {
            Block::Heading { level, spans } => {
                let size = match level {
                    HeadingLevel::Main => 20,
                    HeadingLevel::Sub => 17,
                };
                let bold: Vec<markdown::Span> = spans
                    .iter()
                    .map(|s| match s {
                        markdown::Span::Text(t) | markdown::Span::Bold(t) => markdown::Span::Bold(t.clone()),
                    })
                    .collect();
                col.push(render_spans(&bold, size))
            }
            Block::List(items) => col.push(items.iter().fold(Column::new().spacing(4), |list, item| {
                list.push(row![text("•").size(15), render_spans(item, 15)].spacing(8))
            })),
            Block::Paragraph(spans) => col.push(render_spans(spans, 15)),
        })
        .into()
}

fn view_answer(answer: &AnswerView) -> Element<'static, Message> {
    let body: Element<'static, Message> = match answer {
        AnswerView::AuthRequired { message } => column![
            text("Authentication Required").size(18).font(BOLD),
            text(message.clone()).size(15),
            button(text(controller::AUTH_PROMPT_LABEL).size(14))
                .style(button::primary)
                .on_press(Message::Login),
        ]
        .spacing(10)
        .into(),
        AnswerView::DomainError { message } => {
            text(format!("Error: {}", message)).size(15).color(DANGER).into()
        }
        AnswerView::ConnectionError { message } => {
            text(format!("Connection Error: {}", message)).size(15).color(DANGER).into()
        }
        AnswerView::Answer { search_note, document, .. } => {
            let mut col = Column::new().spacing(12);
            if let Some(note) = search_note {
                col = col.push(
                    container(render_spans(
                        &[
                            markdown::Span::Bold("Search used:".to_string()),
                            markdown::Span::Text(format!(" {}", note)),
                        ],
                        12,
                    ))
                    .padding([8, 12])
                    .style(container::rounded_box),
                );
            }
            col = col.push(render_markdown(document));
            col = col.push(
                row![
                    Space::with_width(Length::Fill),
                    button(text("[Copy]").size(13)).on_press(Message::CopyAnswer),
                    button(text("[Copy HTML]").size(13)).on_press(Message::CopyAnswerHtml),
                ]
                .spacing(8),
            );
            col.into()
        }
    };

    container(body)
        .padding(16)
        .width(Length::Fill)
        .style(container::bordered_box)
        .into()
}

fn view_sources(panel: &sources::SourcePanel, shown_for: Duration) -> Element<'static, Message> {
    let header = text(panel.header.clone()).size(17).font(BOLD);

    panel
        .entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.is_revealed(shown_for))
        .fold(column![header].spacing(10), |col, (i, entry)| {
            let mut card = column![
                row![
                    text(entry.subject.clone()).size(14).font(BOLD),
                    Space::with_width(Length::Fill),
                    text(entry.date.clone()).size(12).color(MUTED),
                ]
                .spacing(10),
                text(format!("From: {}", entry.sender)).size(13).color(MUTED),
                text(entry.body.clone()).size(13),
            ]
            .spacing(6);

            if entry.link().is_some() {
                card = card.push(text("Click to open in Gmail").size(11).color(MUTED));
            }

            col.push(
                button(card)
                    .width(Length::Fill)
                    .padding(12)
                    .style(button::secondary)
                    .on_press_maybe(entry.link().map(|_| Message::OpenSource(i))),
            )
        })
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        let client = BackendClient::with_config("http://127.0.0.1:9/api".to_string(), Duration::from_secs(1)).unwrap();
        let (app, _) = App::new(config::Config::default(), client);
        app
    }

    fn last_toast(app: &App) -> Option<(String, Toast)> {
        app.notifications.iter().last().map(|n| (n.message.clone(), n.kind))
    }

    fn show_answer(app: &mut App) {
        let now = Instant::now();
        let ticket = app.controller.submit("receipts from June", 10, now).unwrap();
        assert!(app.controller.received(ticket.token));
        let outcome = Outcome::Replied(QueryResponse::Success {
            answer: Some("# Receipts\n- Coffee".to_string()),
            sources: Vec::new(),
            search_metadata: None,
        });
        app.controller.apply(ticket.token, ticket.started, outcome, now);
        assert!(app.controller.answer().is_some());
    }

    #[test]
    fn test_login_success_signs_in() {
        let mut app = app();
        app.auth_pending = Some(Pending::Login);
        let _ = app.update(Message::LoginFinished(Ok(AuthState::signed_in(Some("me@gmail.com".into())))));

        assert_eq!(app.auth, AuthState::signed_in(Some("me@gmail.com".into())));
        assert_eq!(app.auth_pending, None);
        assert_eq!(
            last_toast(&app),
            Some(("Successfully authenticated with Gmail!".to_string(), Toast::Success))
        );
    }

    #[test]
    fn test_login_refused_signs_out() {
        let mut app = app();
        let _ = app.update(Message::LoginFinished(Ok(AuthState::signed_out())));

        assert!(!app.auth.authenticated);
        assert_eq!(
            last_toast(&app),
            Some(("Authentication failed. Please try again.".to_string(), Toast::Error))
        );
    }

    #[test]
    fn test_login_transport_error() {
        let mut app = app();
        let _ = app.update(Message::LoginFinished(Err("connection refused".to_string())));

        assert!(!app.auth.authenticated);
        assert_eq!(
            last_toast(&app),
            Some(("Authentication failed. Make sure server is running.".to_string(), Toast::Error))
        );
    }

    #[test]
    fn test_failed_logout_keeps_session_and_results() {
        let mut app = app();
        app.auth = AuthState::signed_in(Some("me@gmail.com".into()));
        show_answer(&mut app);

        app.auth_pending = Some(Pending::Logout);
        let _ = app.update(Message::LogoutFinished(Ok(false)));
        assert_eq!(app.auth, AuthState::signed_in(Some("me@gmail.com".into())));
        assert_eq!(app.auth_pending, None);
        assert!(app.controller.answer().is_some());

        let _ = app.update(Message::LogoutFinished(Err("timed out".to_string())));
        assert!(app.auth.authenticated);
        assert_eq!(
            last_toast(&app),
            Some(("Logout failed. Please try again.".to_string(), Toast::Error))
        );
    }

    #[test]
    fn test_logout_hides_results() {
        let mut app = app();
        app.auth = AuthState::signed_in(None);
        show_answer(&mut app);

        let _ = app.update(Message::LogoutFinished(Ok(true)));
        assert_eq!(app.auth, AuthState::signed_out());
        assert!(app.controller.answer().is_none());
        assert!(app.controller.sources(Instant::now()).is_none());
        assert_eq!(
            last_toast(&app),
            Some(("Successfully logged out. Gmail access revoked.".to_string(), Toast::Success))
        );
    }

    #[test]
    fn test_copy_answer_confirms() {
        let mut app = app();
        show_answer(&mut app);
        let _ = app.update(Message::CopyAnswer);
        assert_eq!(last_toast(&app), Some(("Answer copied to clipboard.".to_string(), Toast::Info)));
    }
}
