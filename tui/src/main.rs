use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use market::{ClientConfig, HttpMarketplace, HttpPool, RoomWs, Runner, SessionStore};
use market_core::{
    countdown::Countdown,
    metrics::Metrics,
    model::*,
    view::{
        Actions, BidCallback, PlaceBidRequest, PrimingRequest, RoomCallback, SendCallback,
        StartAction, View, ViewConfig, ViewContext,
    },
};
use prometheus::Registry;

mod dialog;
mod errors;
mod local_store;
mod onboarding;
mod tui;

use dialog::{Dialog, DialogKey, DialogOutcome};
use tui::{AuctionPanelState, MessagePaneState, RoomListState, WalletPanelState};

enum UiEvent {
    Ready(Arc<dyn Actions>),
    Rooms(Vec<RoomSummary>),
    Messages {
        room_id: String,
        messages: Vec<ChatMessage>,
    },
    Balance {
        previous: Amount,
        next: Amount,
    },
    Payment(PaymentState),
    Auction(Auction),
    Countdown {
        auction_id: String,
        countdown: Countdown,
    },
    OpenedRoom(RoomSummary),
    Toast(String),
    SessionEnded,
}

/// Bridges the engine's view callbacks onto the draw loop's channel.
struct ForwardingView {
    tx: mpsc::UnboundedSender<UiEvent>,
    watch_auction: Option<String>,
}

#[async_trait::async_trait]
impl View for ForwardingView {
    fn new(_config: ViewConfig) -> Result<Self> {
        anyhow::bail!("ForwardingView is constructed around a channel, not a config")
    }

    async fn on_start(&mut self, ctx: &ViewContext) -> Result<StartAction> {
        let _ = self.tx.send(UiEvent::Ready(ctx.actions()));
        Ok(StartAction {
            subscribe_rooms: true,
            watch_balance: true,
            watch_auctions: self.watch_auction.iter().cloned().collect(),
            watch_orders: Vec::new(),
            priming_requests: vec![PrimingRequest::SyncRooms],
        })
    }

    fn on_room_index(&mut self, rooms: &[RoomSummary]) {
        let _ = self.tx.send(UiEvent::Rooms(rooms.to_vec()));
    }

    fn on_room_messages(&mut self, room_id: &str, messages: &[ChatMessage]) {
        let _ = self.tx.send(UiEvent::Messages {
            room_id: room_id.to_string(),
            messages: messages.to_vec(),
        });
    }

    fn on_balance_change(&mut self, previous: i64, next: i64) {
        let _ = self.tx.send(UiEvent::Balance { previous, next });
    }

    fn on_payment_settled(&mut self, payment: &PaymentState) {
        let _ = self.tx.send(UiEvent::Payment(payment.clone()));
    }

    fn on_auction_update(&mut self, auction: &Auction) {
        let _ = self.tx.send(UiEvent::Auction(auction.clone()));
    }

    fn on_countdown(&mut self, auction_id: &str, remaining: &Countdown) {
        let _ = self.tx.send(UiEvent::Countdown {
            auction_id: auction_id.to_string(),
            countdown: *remaining,
        });
    }

    fn on_session_ended(&mut self) {
        let _ = self.tx.send(UiEvent::SessionEnded);
    }
}

struct App {
    me: UserProfile,
    session: SessionStore,
    rooms: RoomListState,
    pane: MessagePaneState,
    auction: AuctionPanelState,
    wallet: WalletPanelState,
    input: String,
    insert_mode: bool,
    dialog: Option<Dialog>,
    actions: Option<Arc<dyn Actions>>,
    status: Option<String>,
    session_over: bool,
}

impl App {
    fn new(me: UserProfile, session: SessionStore) -> Self {
        Self {
            me,
            session,
            rooms: RoomListState::default(),
            pane: MessagePaneState::default(),
            auction: AuctionPanelState::default(),
            wallet: WalletPanelState::default(),
            input: String::new(),
            insert_mode: false,
            dialog: None,
            actions: None,
            status: None,
            session_over: false,
        }
    }

    fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::Ready(actions) => self.actions = Some(actions),
            UiEvent::Rooms(rooms) => self.rooms.apply(rooms),
            UiEvent::Messages { room_id, messages } => self.pane.apply(&room_id, messages),
            UiEvent::Balance { previous, next } => self.wallet.apply_increase(previous, next),
            UiEvent::Payment(payment) => {
                self.status = Some(format!("Payment completed for order {}", payment.order_id));
            }
            UiEvent::Auction(auction) => self.auction.apply_auction(auction),
            UiEvent::Countdown {
                auction_id,
                countdown,
            } => self.auction.apply_countdown(&auction_id, &countdown),
            UiEvent::OpenedRoom(room) => {
                self.pane.open(room.room_id.clone());
                self.status = Some(format!(
                    "Conversation with {}",
                    room.peer_name.clone().unwrap_or_else(|| room
                        .peer_of(&self.me.id)
                        .unwrap_or("?")
                        .to_string())
                ));
            }
            UiEvent::Toast(text) => self.status = Some(text),
            UiEvent::SessionEnded => {
                self.session_over = true;
                self.status = Some("Session ended — press q to quit".to_string());
            }
        }
    }

    /// Returns true when the app should exit.
    fn handle_key(&mut self, key: KeyEvent, ui_tx: &mpsc::UnboundedSender<UiEvent>) -> bool {
        if let Some(dialog) = self.dialog.as_mut() {
            let mapped = match key.code {
                KeyCode::Char(c) => Some(DialogKey::Char(c)),
                KeyCode::Backspace => Some(DialogKey::Backspace),
                KeyCode::Enter => Some(DialogKey::Enter),
                KeyCode::Esc => Some(DialogKey::Esc),
                _ => None,
            };
            if let Some(mapped) = mapped {
                if let Some(outcome) = dialog.handle_key(mapped) {
                    self.dialog = None;
                    self.dispatch_dialog(outcome, ui_tx);
                }
            }
            return false;
        }

        if self.insert_mode {
            match key.code {
                KeyCode::Esc => self.insert_mode = false,
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Enter => self.send_current_input(ui_tx),
                KeyCode::Char(c) => self.input.push(c),
                _ => {}
            }
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Up => self.rooms.select_prev(),
            KeyCode::Down => self.rooms.select_next(),
            KeyCode::Enter => self.open_selected_room(),
            KeyCode::Char('i') => {
                if self.pane.room_id.is_some() {
                    self.insert_mode = true;
                }
            }
            KeyCode::Char('c') => self.dialog = Some(Dialog::contact()),
            KeyCode::Char('b') => {
                if let Some(minimum) = self.auction.quick_bid() {
                    self.dialog = Some(Dialog::bid(minimum));
                }
            }
            KeyCode::Char('n') => {
                if let Some(amount) = self.auction.quick_bid() {
                    self.submit_bid(amount, ui_tx);
                }
            }
            KeyCode::Char('y') => self.submit_buy_now(ui_tx),
            KeyCode::Char('t') => self.wallet.dismiss_toast(),
            KeyCode::Char('o') => {
                // sign out: in-memory session and the persisted token +
                // profile pair go together
                self.session.logout();
                tokio::spawn(async {
                    if let Err(err) = local_store::clear_session().await {
                        tracing::warn!(target: "tui", %err, "failed to clear stored session");
                    }
                });
            }
            _ => {}
        }
        false
    }

    fn dispatch_dialog(&mut self, outcome: DialogOutcome, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        match outcome {
            DialogOutcome::BidConfirmed(amount) => self.submit_bid(amount, ui_tx),
            DialogOutcome::ContactConfirmed(peer_id) => {
                let Some(actions) = self.actions.clone() else {
                    return;
                };
                let tx = ui_tx.clone();
                let cb: RoomCallback = Arc::new(move |result| {
                    let _ = match result {
                        Ok(room) => tx.send(UiEvent::OpenedRoom(room)),
                        Err(err) => tx.send(UiEvent::Toast(format!("Could not start chat: {err:#}"))),
                    };
                });
                if let Err(err) = actions.start_conversation(&peer_id, cb) {
                    self.status = Some(format!("Could not start chat: {err:#}"));
                }
            }
            DialogOutcome::Cancelled => {}
        }
    }

    fn submit_bid(&mut self, amount: Amount, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        let (Some(actions), Some(auction)) = (self.actions.clone(), self.auction.auction.as_ref())
        else {
            return;
        };
        let tx = ui_tx.clone();
        let cb: BidCallback = Arc::new(move |result| {
            let text = match result {
                Ok(ack) if ack.success => format!(
                    "Bid accepted{}",
                    ack.new_price
                        .map(|p| format!(" — price now {}", p))
                        .unwrap_or_default()
                ),
                Ok(ack) => format!(
                    "Bid rejected: {}",
                    ack.error_message.unwrap_or_else(|| "unknown".to_string())
                ),
                Err(err) => format!("Bid failed: {err:#}"),
            };
            let _ = tx.send(UiEvent::Toast(text));
        });
        let request =
            PlaceBidRequest::new(auction.id.clone(), amount).with_client_ref(new_client_ref());
        if let Err(err) = actions.place_bid(request, cb) {
            self.status = Some(format!("Bid failed: {err:#}"));
        }
    }

    fn submit_buy_now(&mut self, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        let (Some(actions), Some(auction)) = (self.actions.clone(), self.auction.auction.as_ref())
        else {
            return;
        };
        let Some(price) = auction.buy_now_price else {
            self.status = Some("This auction has no buy-now price".to_string());
            return;
        };
        let tx = ui_tx.clone();
        let cb: BidCallback = Arc::new(move |result| {
            let text = match result {
                Ok(ack) if ack.success => format!("Bought now at {}", price),
                Ok(ack) => format!(
                    "Buy-now rejected: {}",
                    ack.error_message.unwrap_or_else(|| "unknown".to_string())
                ),
                Err(err) => format!("Buy-now failed: {err:#}"),
            };
            let _ = tx.send(UiEvent::Toast(text));
        });
        if let Err(err) = actions.buy_now(&auction.id, cb) {
            self.status = Some(format!("Buy-now failed: {err:#}"));
        }
    }

    fn open_selected_room(&mut self) {
        let Some(room) = self.rooms.selected_room() else {
            return;
        };
        let room_id = room.room_id.clone();
        self.pane.open(room_id.clone());
        if let Some(actions) = self.actions.clone() {
            tokio::spawn(async move {
                if let Err(err) = actions.open_room(Some(room_id)).await {
                    tracing::warn!(target: "tui", ?err, "open_room failed");
                }
            });
        }
    }

    fn send_current_input(&mut self, ui_tx: &mpsc::UnboundedSender<UiEvent>) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }
        let (Some(actions), Some(room_id)) = (self.actions.clone(), self.pane.room_id.clone())
        else {
            return;
        };
        self.input.clear();
        let tx = ui_tx.clone();
        let cb: SendCallback = Arc::new(move |result| {
            // the sent message itself arrives through the room snapshot
            if let Err(err) = result {
                let _ = tx.send(UiEvent::Toast(format!("Send failed: {err:#}")));
            }
        });
        if let Err(err) = actions.send_message(&room_id, &text, cb) {
            self.status = Some(format!("Send failed: {err:#}"));
        }
    }
}

fn fmt_time(ts: TimestampMs) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn draw(f: &mut Frame<'_>, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(32), Constraint::Min(20)])
        .split(rows[0]);

    draw_rooms(f, app, main[0]);
    draw_messages(f, app, main[1]);
    draw_auction(f, app, rows[1]);
    draw_wallet(f, app, rows[2]);

    let help = if app.insert_mode {
        "Esc leave input · Enter send"
    } else {
        "q quit · ↑/↓ rooms · Enter open · i write · c new chat · b bid · n quick-bid · y buy-now · o sign out"
    };
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        rows[3],
    );

    if let Some(dialog) = &app.dialog {
        draw_dialog(f, dialog);
    }
}

fn draw_rooms(f: &mut Frame<'_>, app: &App, area: Rect) {
    let items: Vec<ListItem<'_>> = app
        .rooms
        .rooms
        .iter()
        .map(|room| {
            let name = room
                .peer_name
                .clone()
                .or_else(|| room.peer_of(&app.me.id).map(|s| s.to_string()))
                .unwrap_or_else(|| room.room_id.clone());
            let when = room.last_message_ts.map(fmt_time).unwrap_or_default();
            let preview = room.last_message_text.clone().unwrap_or_default();
            ListItem::new(Line::from(vec![
                Span::styled(name, Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" "),
                Span::styled(when, Style::default().fg(Color::DarkGray)),
                Span::raw(" "),
                Span::styled(preview, Style::default().fg(Color::Gray)),
            ]))
        })
        .collect();
    let mut state = ListState::default();
    if !app.rooms.rooms.is_empty() {
        state.select(Some(app.rooms.selected));
    }
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Chats"))
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_messages(f: &mut Frame<'_>, app: &App, area: Rect) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(4), Constraint::Length(3)])
        .split(area);

    let lines: Vec<Line<'_>> = if let Some(placeholder) = app.pane.placeholder() {
        vec![Line::from(Span::styled(
            placeholder,
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        app.pane
            .messages
            .iter()
            .map(|m| {
                let who = if m.sender_id == app.me.id {
                    "me".to_string()
                } else {
                    m.sender_id.clone()
                };
                Line::from(vec![
                    Span::styled(fmt_time(m.timestamp), Style::default().fg(Color::DarkGray)),
                    Span::raw(" "),
                    Span::styled(who, Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(": "),
                    Span::raw(m.text.clone()),
                ])
            })
            .collect()
    };
    let title = app.pane.room_id.clone().unwrap_or_else(|| "No room".into());
    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title(title)),
        parts[0],
    );

    let input_style = if app.insert_mode {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    f.render_widget(
        Paragraph::new(app.input.as_str())
            .style(input_style)
            .block(Block::default().borders(Borders::ALL).title("Message")),
        parts[1],
    );
}

fn draw_auction(f: &mut Frame<'_>, app: &App, area: Rect) {
    let line = match &app.auction.auction {
        Some(auction) => {
            let countdown = if app.auction.awaiting_server_close() {
                "ended (awaiting close)".to_string()
            } else if app.auction.display_ended() {
                "ended".to_string()
            } else {
                app.auction.countdown.display()
            };
            let quick = app
                .auction
                .quick_bid()
                .map(|q| format!(" · next bid {}", q))
                .unwrap_or_default();
            format!(
                "lot {} · price {} · bids {} · {} · {:?}{}",
                auction.listing_id,
                auction.current_price,
                auction.bid_count,
                countdown,
                auction.status,
                quick
            )
        }
        None => "no auction watched".to_string(),
    };
    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Auction")),
        area,
    );
}

fn draw_wallet(f: &mut Frame<'_>, app: &App, area: Rect) {
    let balance = app
        .wallet
        .balance
        .map(|b| format!("balance {}", b))
        .unwrap_or_else(|| "balance —".to_string());
    let mut spans = vec![Span::raw(balance)];
    if let Some(toast) = &app.wallet.toast {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(
            toast.clone(),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ));
    }
    if let Some(status) = &app.status {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Cyan)));
    }
    f.render_widget(
        Paragraph::new(Line::from(spans))
            .block(Block::default().borders(Borders::ALL).title("Wallet")),
        area,
    );
}

fn draw_dialog(f: &mut Frame<'_>, dialog: &Dialog) {
    let area = centered_rect(44, 5, f.area());
    f.render_widget(Clear, area);
    let mut lines = vec![Line::from(vec![
        Span::raw("> "),
        Span::styled(
            dialog.input.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
    ])];
    lines.push(Line::from(Span::styled(
        dialog
            .error
            .clone()
            .unwrap_or_else(|| dialog.hint()),
        Style::default().fg(if dialog.error.is_some() {
            Color::Red
        } else {
            Color::DarkGray
        }),
    )));
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(dialog.title()),
        ),
        area,
    );
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    ui_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
) -> Result<()> {
    loop {
        while let Ok(event) = ui_rx.try_recv() {
            app.apply(event);
        }
        terminal.draw(|f| draw(f, app))?;
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key(key, &ui_tx) {
                    return Ok(());
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // optional: an auction id to watch alongside chat
    let watch_auction = std::env::args().nth(1);

    let mut cfg = ClientConfig::default();
    if let Ok(base) = std::env::var("SELLO_API_URL") {
        cfg.http.base_url = base;
    }
    if let Ok(ws_url) = std::env::var("SELLO_WS_URL") {
        cfg.realtime.ws_url = ws_url;
    }

    let registry = Registry::new();
    let metrics = Metrics::new(&registry);
    let session = SessionStore::new();
    let pool = Arc::new(HttpPool::new(&cfg, &registry, session.clone())?);
    let api = Arc::new(HttpMarketplace::new(pool, session.clone()));

    let signed_in = onboarding::run(api.as_ref())
        .await
        .map_err(|err| anyhow::anyhow!("{err:#}"))?;

    let ws = Arc::new(RoomWs::new(&cfg.realtime)?);
    let runner = Arc::new(Runner::new(
        cfg,
        api.clone(),
        ws.clone(),
        session.clone(),
        metrics,
    ));

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let view = ForwardingView {
        tx: ui_tx.clone(),
        watch_auction,
    };
    let runner_handle = {
        let runner = runner.clone();
        tokio::spawn(async move {
            if let Err(err) = runner.run_view(view).await {
                tracing::warn!(target: "tui", ?err, "runner stopped");
            }
        })
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(signed_in.user, session.clone());
    let result = run_app(&mut terminal, &mut app, &mut ui_rx, ui_tx).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    runner_handle.abort();
    ws.close().await.ok();

    result
}
