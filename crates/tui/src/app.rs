use std::{io, thread, time::Duration};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::{error, info};

use shoptui_core::{
    catalog::CatalogEvent,
    config::AppConfig,
    models::{Product, Receipt},
    session::{Session, SessionError, FUND_PRESETS, LARGE_BALANCE_THRESHOLD, MAX_SINGLE_TOPUP},
};

use crate::block_font;

const TICK_RATE: Duration = Duration::from_millis(250);
const MAX_INPUT_LEN: usize = 64;

const START_ITEMS: [&str; 3] = ["Sign In", "Sign Up", "Quit"];
const DASH_ITEMS: [&str; 6] = [
    "Fund Wallet",
    "Browse Products",
    "View Cart",
    "Order History",
    "Manage Account",
    "Sign Out",
];
const ACCOUNT_ITEMS: [&str; 7] = [
    "Change Username",
    "Change Email",
    "Change Password",
    "View Account Details",
    "Reset Balance",
    "Delete Account",
    "Back",
];

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Start,
    SignIn,
    SignUp,
    Dashboard,
    FundWallet,
    Browse,
    Cart,
    Checkout,
    History,
    Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowseMode {
    List,
    Filter,
}

enum AppEvent {
    Input(Event),
    Tick,
}

/// Single-line text editor used by every form and modal.
#[derive(Debug, Clone, Default)]
struct InputField {
    value: String,
    cursor: usize,
    masked: bool,
}

impl InputField {
    fn masked() -> Self {
        Self {
            masked: true,
            ..Self::default()
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.value.len() as isize;
        let mut next = self.cursor as isize + delta;
        if next < 0 {
            next = 0;
        } else if next > len {
            next = len;
        }
        self.cursor = next as usize;
    }

    fn move_home(&mut self) {
        self.cursor = 0;
    }

    fn move_end(&mut self) {
        self.cursor = self.value.len();
    }

    fn insert(&mut self, ch: char) {
        if self.value.len() >= MAX_INPUT_LEN {
            return;
        }
        if ch.is_ascii() && !ch.is_ascii_control() {
            self.value.insert(self.cursor, ch);
            self.cursor += ch.len_utf8();
        }
    }

    fn backspace(&mut self) {
        if self.cursor > 0 && self.cursor <= self.value.len() {
            self.cursor -= 1;
            self.value.remove(self.cursor);
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.value.len() {
            self.value.remove(self.cursor);
        }
    }

    fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.cursor = self.value.len();
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn display(&self) -> String {
        if self.masked {
            "•".repeat(self.value.chars().count())
        } else {
            self.value.clone()
        }
    }
}

#[derive(Debug, Default)]
struct SignInForm {
    identity: InputField,
    password: InputField,
    focus: usize,
}

impl SignInForm {
    fn new() -> Self {
        Self {
            identity: InputField::default(),
            password: InputField::masked(),
            focus: 0,
        }
    }

    fn focused_mut(&mut self) -> &mut InputField {
        match self.focus {
            0 => &mut self.identity,
            _ => &mut self.password,
        }
    }
}

#[derive(Debug, Default)]
struct SignUpForm {
    username: InputField,
    email: InputField,
    password: InputField,
    focus: usize,
    reveal_password: bool,
}

impl SignUpForm {
    fn new() -> Self {
        Self {
            username: InputField::default(),
            email: InputField::default(),
            password: InputField::masked(),
            focus: 0,
            reveal_password: false,
        }
    }

    fn focused_mut(&mut self) -> &mut InputField {
        match self.focus {
            0 => &mut self.username,
            1 => &mut self.email,
            _ => &mut self.password,
        }
    }
}

#[derive(Debug, Default)]
struct FundState {
    cursor: usize,
    custom: Option<InputField>,
}

#[derive(Debug)]
struct BrowseState {
    products: Vec<Product>,
    filter: String,
    mode: BrowseMode,
    cursor: usize,
    offset: usize,
    list_height: usize,
}

impl Default for BrowseState {
    fn default() -> Self {
        Self {
            products: Vec::new(),
            filter: String::new(),
            mode: BrowseMode::List,
            cursor: 0,
            offset: 0,
            list_height: 1,
        }
    }
}

impl BrowseState {
    fn move_cursor(&mut self, delta: isize) {
        if self.products.is_empty() {
            return;
        }
        let len = self.products.len() as isize;
        let mut idx = self.cursor as isize + delta;
        if idx < 0 {
            idx = 0;
        } else if idx >= len {
            idx = len - 1;
        }
        self.cursor = idx as usize;
        self.ensure_cursor_visible();
    }

    fn clamp_cursor(&mut self) {
        if self.products.is_empty() {
            self.cursor = 0;
            self.offset = 0;
        } else if self.cursor >= self.products.len() {
            self.cursor = self.products.len() - 1;
        }
        self.ensure_cursor_visible();
    }

    fn ensure_cursor_visible(&mut self) {
        if self.products.is_empty() || self.list_height == 0 {
            self.offset = 0;
            return;
        }
        let height = self.list_height;
        let max_offset = self.products.len().saturating_sub(height);
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + height {
            self.offset = self.cursor + 1 - height;
        }
        if self.offset > max_offset {
            self.offset = max_offset;
        }
    }

    fn current(&self) -> Option<&Product> {
        self.products.get(self.cursor)
    }
}

#[derive(Debug)]
enum CartModal {
    Quantity { index: usize, input: InputField },
    ConfirmClear,
}

#[derive(Debug, Default)]
struct CartState {
    cursor: usize,
    modal: Option<CartModal>,
}

#[derive(Debug, Default)]
struct HistoryState {
    receipts: Vec<Receipt>,
    cursor: usize,
    offset: usize,
    list_height: usize,
}

impl HistoryState {
    fn move_cursor(&mut self, delta: isize) {
        if self.receipts.is_empty() {
            return;
        }
        let len = self.receipts.len() as isize;
        let mut idx = self.cursor as isize + delta;
        if idx < 0 {
            idx = 0;
        } else if idx >= len {
            idx = len - 1;
        }
        self.cursor = idx as usize;
        let height = self.list_height.max(1);
        let max_offset = self.receipts.len().saturating_sub(height);
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + height {
            self.offset = self.cursor + 1 - height;
        }
        if self.offset > max_offset {
            self.offset = max_offset;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountOp {
    ChangeUsername,
    ChangeEmail,
    ChangePassword,
    ViewDetails,
    ResetBalance,
    DeleteAccount,
}

impl AccountOp {
    fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::ChangeUsername),
            1 => Some(Self::ChangeEmail),
            2 => Some(Self::ChangePassword),
            3 => Some(Self::ViewDetails),
            4 => Some(Self::ResetBalance),
            5 => Some(Self::DeleteAccount),
            _ => None,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::ChangeUsername => "Change Username",
            Self::ChangeEmail => "Change Email",
            Self::ChangePassword => "Change Password",
            Self::ViewDetails => "Account Details",
            Self::ResetBalance => "Reset Balance",
            Self::DeleteAccount => "Delete Account",
        }
    }
}

#[derive(Debug)]
enum AccountStage {
    Verify(InputField),
    NewValue(InputField),
    NewPassword {
        input: InputField,
        confirm: InputField,
        focus: usize,
    },
    Confirm {
        // new password held until the user answers y/n
        pending_password: Option<String>,
    },
    TypedConfirm(InputField),
    Details,
}

#[derive(Debug)]
struct AccountFlow {
    op: AccountOp,
    stage: AccountStage,
}

#[derive(Debug, Default)]
struct AccountState {
    cursor: usize,
    flow: Option<AccountFlow>,
}

/// High-level application state for the storefront TUI.
pub struct ShopApp {
    config: AppConfig,
    session: Session,
    screen: Screen,
    theme: Theme,
    status: String,
    should_quit: bool,
    start_cursor: usize,
    dash_cursor: usize,
    sign_in: SignInForm,
    sign_up: SignUpForm,
    fund: FundState,
    browse: BrowseState,
    cart: CartState,
    history: HistoryState,
    account: AccountState,
    watch_rx: Option<mpsc::Receiver<CatalogEvent>>,
}

impl ShopApp {
    pub fn new(config: AppConfig, session: Session) -> Self {
        Self {
            config,
            session,
            screen: Screen::Start,
            theme: Theme::default(),
            status: "Ready".to_string(),
            should_quit: false,
            start_cursor: 0,
            dash_cursor: 0,
            sign_in: SignInForm::new(),
            sign_up: SignUpForm::new(),
            fund: FundState::default(),
            browse: BrowseState::default(),
            cart: CartState::default(),
            history: HistoryState::default(),
            account: AccountState::default(),
            watch_rx: None,
        }
    }

    pub fn attach_watch(&mut self, receiver: mpsc::Receiver<CatalogEvent>) {
        self.watch_rx = Some(receiver);
    }

    pub async fn run(&mut self) -> Result<()> {
        match self.session.catalog().products() {
            Ok(products) => self.set_status(format!("Loaded {} products", products.len())),
            Err(err) => self.set_status(format!("Catalog load failed: {err}")),
        }

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx);

        let mut watch_rx = self.watch_rx.take();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.should_quit {
                break;
            }

            if watch_rx.is_some() {
                let mut watch_closed = false;
                let rx = watch_rx.as_mut().unwrap();
                tokio::select! {
                    maybe_event = event_rx.recv() => {
                        if !self.process_app_event(maybe_event) {
                            break;
                        }
                    }
                    maybe_change = rx.recv() => {
                        match maybe_change {
                            Some(event) => self.handle_catalog_event(event),
                            None => watch_closed = true,
                        }
                    }
                }
                if watch_closed {
                    watch_rx = None;
                }
            } else {
                let maybe_event = event_rx.recv().await;
                if !self.process_app_event(maybe_event) {
                    break;
                }
            }

            if self.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        Ok(())
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn money(&self, value: f64) -> String {
        format!("{} {}", self.config.currency, format_amount(value))
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Err(err) = self.handle_input(event) {
                    self.set_status(format!("Error: {err}"));
                }
                true
            }
            Some(AppEvent::Tick) => true,
            None => false,
        }
    }

    fn handle_catalog_event(&mut self, event: CatalogEvent) {
        match event {
            CatalogEvent::Changed => match self.session.catalog().reload() {
                Ok(total) => {
                    let dropped = self.session.reattach_cart();
                    self.refresh_browse();
                    self.clamp_cart_cursor();
                    info!(total, dropped, "catalog reloaded after change");
                    if dropped > 0 {
                        self.set_status(format!(
                            "Catalog refreshed ({total} products); {dropped} cart line(s) no longer available"
                        ));
                    } else {
                        self.set_status(format!("Catalog refreshed ({total} products)"));
                    }
                }
                Err(err) => {
                    error!(?err, "catalog reload failed");
                    self.set_status(format!("Catalog reload failed: {err}"));
                }
            },
            CatalogEvent::Error(err) => {
                error!(?err, "catalog watcher failed");
                self.set_status(format!("Catalog watch failed: {err}"));
            }
        }
    }

    fn refresh_browse(&mut self) {
        match self.session.catalog().search(&self.browse.filter) {
            Ok(products) => {
                self.browse.products = products;
                self.browse.clamp_cursor();
            }
            Err(err) => self.set_status(format!("Search failed: {err}")),
        }
    }

    fn refresh_history(&mut self) {
        match self.session.order_history() {
            Ok(receipts) => {
                self.history.receipts = receipts;
                self.history.cursor = 0;
                self.history.offset = 0;
            }
            Err(err) => self.set_status(format!("Failed to load order history: {err}")),
        }
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        let Event::Key(key) = event else {
            return Ok(());
        };
        if key.kind != event::KeyEventKind::Press {
            return Ok(());
        }
        match self.screen {
            Screen::Start => self.handle_start_key(key),
            Screen::SignIn => self.handle_sign_in_key(key),
            Screen::SignUp => self.handle_sign_up_key(key),
            Screen::Dashboard => self.handle_dashboard_key(key),
            Screen::FundWallet => self.handle_fund_key(key),
            Screen::Browse => self.handle_browse_key(key),
            Screen::Cart => self.handle_cart_key(key),
            Screen::Checkout => self.handle_checkout_key(key),
            Screen::History => self.handle_history_key(key),
            Screen::Account => self.handle_account_key(key),
        }
        Ok(())
    }

    fn handle_start_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => {
                self.start_cursor = (self.start_cursor + 1).min(START_ITEMS.len() - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.start_cursor = self.start_cursor.saturating_sub(1);
            }
            KeyCode::Enter => match self.start_cursor {
                0 => {
                    self.sign_in = SignInForm::new();
                    self.screen = Screen::SignIn;
                    self.set_status("Sign in with your username or email");
                }
                1 => {
                    self.sign_up = SignUpForm::new();
                    self.screen = Screen::SignUp;
                    self.set_status("Create a new account (Ctrl-G generates a password)");
                }
                _ => self.should_quit = true,
            },
            _ => {}
        }
    }

    fn handle_sign_in_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.screen = Screen::Start;
                self.set_status("Sign in cancelled");
            }
            KeyCode::Tab | KeyCode::Down => self.sign_in.focus = (self.sign_in.focus + 1) % 2,
            KeyCode::BackTab | KeyCode::Up => {
                self.sign_in.focus = (self.sign_in.focus + 1) % 2;
            }
            KeyCode::Enter => {
                if self.sign_in.focus == 0 {
                    self.sign_in.focus = 1;
                } else {
                    self.submit_sign_in();
                }
            }
            KeyCode::Left => self.sign_in.focused_mut().move_cursor(-1),
            KeyCode::Right => self.sign_in.focused_mut().move_cursor(1),
            KeyCode::Home => self.sign_in.focused_mut().move_home(),
            KeyCode::End => self.sign_in.focused_mut().move_end(),
            KeyCode::Backspace => self.sign_in.focused_mut().backspace(),
            KeyCode::Delete => self.sign_in.focused_mut().delete(),
            KeyCode::Char(ch) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    self.sign_in.focused_mut().insert(ch);
                }
            }
            _ => {}
        }
    }

    fn submit_sign_in(&mut self) {
        let identity = self.sign_in.identity.value().to_string();
        let password = self.sign_in.password.value().to_string();
        match self.session.sign_in(&identity, &password) {
            Ok(()) => {
                let username = self
                    .session
                    .current()
                    .map(|account| account.username.clone())
                    .unwrap_or_default();
                self.enter_dashboard(format!("Welcome back, {username}!"));
            }
            Err(err) => self.set_status(format!("Sign in failed: {err}")),
        }
    }

    fn handle_sign_up_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.screen = Screen::Start;
                self.set_status("Sign up cancelled");
            }
            KeyCode::Tab | KeyCode::Down => self.sign_up.focus = (self.sign_up.focus + 1) % 3,
            KeyCode::BackTab | KeyCode::Up => {
                self.sign_up.focus = (self.sign_up.focus + 2) % 3;
            }
            KeyCode::Char('g') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                let generated = shoptui_core::auth::generate_password();
                self.sign_up.password.set(generated);
                self.sign_up.reveal_password = true;
                self.set_status("Generated a password; it stays visible until you submit");
            }
            KeyCode::Enter => {
                if self.sign_up.focus < 2 {
                    self.sign_up.focus += 1;
                } else {
                    self.submit_sign_up();
                }
            }
            KeyCode::Left => self.sign_up.focused_mut().move_cursor(-1),
            KeyCode::Right => self.sign_up.focused_mut().move_cursor(1),
            KeyCode::Home => self.sign_up.focused_mut().move_home(),
            KeyCode::End => self.sign_up.focused_mut().move_end(),
            KeyCode::Backspace => self.sign_up.focused_mut().backspace(),
            KeyCode::Delete => self.sign_up.focused_mut().delete(),
            KeyCode::Char(ch) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    self.sign_up.focused_mut().insert(ch);
                }
            }
            _ => {}
        }
    }

    fn submit_sign_up(&mut self) {
        let username = self.sign_up.username.value().to_string();
        let email = self.sign_up.email.value().to_string();
        let password = self.sign_up.password.value().to_string();
        match self.session.sign_up(&username, &email, &password) {
            Ok(()) => {
                self.sign_up.reveal_password = false;
                self.enter_dashboard(format!("Account created. Welcome, {username}!"));
            }
            Err(err) => self.set_status(format!("Sign up failed: {err}")),
        }
    }

    fn enter_dashboard(&mut self, message: String) {
        self.screen = Screen::Dashboard;
        self.dash_cursor = 0;
        self.refresh_browse();
        self.set_status(message);
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.dash_cursor = (self.dash_cursor + 1).min(DASH_ITEMS.len() - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.dash_cursor = self.dash_cursor.saturating_sub(1);
            }
            KeyCode::Enter => match self.dash_cursor {
                0 => {
                    self.fund = FundState::default();
                    self.screen = Screen::FundWallet;
                    self.set_status("Pick a top-up amount");
                }
                1 => {
                    self.refresh_browse();
                    self.screen = Screen::Browse;
                    self.set_status("Enter adds the selected product to your cart ('/' to search)");
                }
                2 => {
                    self.cart = CartState::default();
                    self.screen = Screen::Cart;
                }
                3 => {
                    self.refresh_history();
                    self.screen = Screen::History;
                }
                4 => {
                    self.account = AccountState::default();
                    self.screen = Screen::Account;
                }
                _ => self.sign_out(),
            },
            _ => {}
        }
    }

    fn sign_out(&mut self) {
        self.session.sign_out();
        self.screen = Screen::Start;
        self.start_cursor = 0;
        self.set_status("Signed out; cart reservations released");
    }

    fn handle_fund_key(&mut self, key: KeyEvent) {
        // custom amount prompt handles its own keys
        if let Some(mut input) = self.fund.custom.take() {
            match key.code {
                KeyCode::Esc => {
                    self.set_status("Top-up cancelled");
                }
                KeyCode::Enter => {
                    match input.value().trim().parse::<f64>() {
                        Ok(amount) => self.apply_fund(amount),
                        Err(_) => {
                            self.set_status("Enter a numeric amount");
                            self.fund.custom = Some(input);
                        }
                    }
                    return;
                }
                KeyCode::Left => {
                    input.move_cursor(-1);
                    self.fund.custom = Some(input);
                }
                KeyCode::Right => {
                    input.move_cursor(1);
                    self.fund.custom = Some(input);
                }
                KeyCode::Backspace => {
                    input.backspace();
                    self.fund.custom = Some(input);
                }
                KeyCode::Delete => {
                    input.delete();
                    self.fund.custom = Some(input);
                }
                KeyCode::Char(ch) if ch.is_ascii_digit() || ch == '.' => {
                    input.insert(ch);
                    self.fund.custom = Some(input);
                }
                _ => self.fund.custom = Some(input),
            }
            return;
        }

        let options = FUND_PRESETS.len() + 1;
        match key.code {
            KeyCode::Esc => self.screen = Screen::Dashboard,
            KeyCode::Char('j') | KeyCode::Down => {
                self.fund.cursor = (self.fund.cursor + 1).min(options - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.fund.cursor = self.fund.cursor.saturating_sub(1);
            }
            KeyCode::Enter => {
                if self.fund.cursor < FUND_PRESETS.len() {
                    self.apply_fund(FUND_PRESETS[self.fund.cursor]);
                } else {
                    self.fund.custom = Some(InputField::default());
                }
            }
            _ => {}
        }
    }

    fn apply_fund(&mut self, amount: f64) {
        match self.session.fund_wallet(amount) {
            Ok(balance) => {
                let formatted = self.money(amount);
                let balance = self.money(balance);
                self.set_status(format!("Payment of {formatted} successful. Balance: {balance}"));
                self.screen = Screen::Dashboard;
            }
            Err(err @ SessionError::AmountTooLarge) => {
                let cap = self.money(MAX_SINGLE_TOPUP);
                self.set_status(format!("{err} ({cap})"));
            }
            Err(err) => self.set_status(format!("Top-up failed: {err}")),
        }
    }

    fn handle_browse_key(&mut self, key: KeyEvent) {
        match self.browse.mode {
            BrowseMode::Filter => self.handle_filter_key(key),
            BrowseMode::List => self.handle_browse_list_key(key),
        }
    }

    fn handle_filter_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.browse.mode = BrowseMode::List;
                self.browse.filter.clear();
                self.refresh_browse();
                self.set_status("Search cleared");
            }
            KeyCode::Enter => {
                self.browse.mode = BrowseMode::List;
                self.set_status(format!("Search applied: {}", self.browse.filter));
            }
            KeyCode::Backspace => {
                self.browse.filter.pop();
                self.refresh_browse();
            }
            KeyCode::Char(ch) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    self.browse.filter.push(ch);
                    self.refresh_browse();
                }
            }
            _ => {}
        }
    }

    fn handle_browse_list_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.screen = Screen::Dashboard,
            KeyCode::Char('j') | KeyCode::Down => self.browse.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.browse.move_cursor(-1),
            KeyCode::PageDown => self.browse.move_cursor(self.browse.list_height.max(1) as isize),
            KeyCode::PageUp => {
                self.browse.move_cursor(-(self.browse.list_height.max(1) as isize));
            }
            KeyCode::Home => {
                self.browse.cursor = 0;
                self.browse.ensure_cursor_visible();
            }
            KeyCode::End => {
                self.browse.cursor = self.browse.products.len().saturating_sub(1);
                self.browse.ensure_cursor_visible();
            }
            KeyCode::Char('/') => {
                self.browse.mode = BrowseMode::Filter;
                self.set_status("Type to search product names (ANY word matches)");
            }
            KeyCode::Char('c') => {
                self.cart = CartState::default();
                self.screen = Screen::Cart;
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                match self.session.catalog().reload() {
                    Ok(total) => {
                        let dropped = self.session.reattach_cart();
                        self.refresh_browse();
                        if dropped > 0 {
                            self.set_status(format!(
                                "Reloaded {total} products; {dropped} cart line(s) dropped"
                            ));
                        } else {
                            self.set_status(format!("Reloaded {total} products"));
                        }
                    }
                    Err(err) => self.set_status(format!("Reload failed: {err}")),
                }
            }
            KeyCode::Enter => self.add_selected_to_cart(),
            _ => {}
        }
    }

    fn add_selected_to_cart(&mut self) {
        let Some(product) = self.browse.current().cloned() else {
            self.set_status("Nothing to add");
            return;
        };
        match self.session.cart_add(product.id) {
            Ok(item) => {
                self.refresh_browse();
                let remaining = self
                    .session
                    .catalog()
                    .product(product.id)
                    .map(|fresh| fresh.stock)
                    .unwrap_or(0);
                self.set_status(format!(
                    "Added {} to cart (x{}, {remaining} left in stock)",
                    item.name, item.quantity
                ));
            }
            Err(err) => self.set_status(format!("Cannot add: {err}")),
        }
    }

    fn handle_cart_key(&mut self, key: KeyEvent) {
        // modals first
        if let Some(modal) = self.cart.modal.take() {
            match modal {
                CartModal::Quantity { index, mut input } => match key.code {
                    KeyCode::Esc => self.set_status("Quantity unchanged"),
                    KeyCode::Enter => match input.value().trim().parse::<u32>() {
                        Ok(quantity) => match self.session.cart_update_quantity(index, quantity) {
                            Ok(item) => {
                                self.refresh_browse();
                                self.set_status(format!(
                                    "Updated {} quantity to {}",
                                    item.name, item.quantity
                                ));
                            }
                            Err(err) => self.set_status(format!("Cannot update: {err}")),
                        },
                        Err(_) => {
                            self.set_status("Enter a whole number");
                            self.cart.modal = Some(CartModal::Quantity { index, input });
                        }
                    },
                    KeyCode::Backspace => {
                        input.backspace();
                        self.cart.modal = Some(CartModal::Quantity { index, input });
                    }
                    KeyCode::Char(ch) if ch.is_ascii_digit() => {
                        input.insert(ch);
                        self.cart.modal = Some(CartModal::Quantity { index, input });
                    }
                    _ => self.cart.modal = Some(CartModal::Quantity { index, input }),
                },
                CartModal::ConfirmClear => match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => {
                        let released = self.session.cart_clear();
                        self.refresh_browse();
                        self.set_status(format!("Cart cleared ({released} line(s) released)"));
                    }
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                        self.set_status("Cart untouched");
                    }
                    _ => self.cart.modal = Some(CartModal::ConfirmClear),
                },
            }
            self.clamp_cart_cursor();
            return;
        }

        let len = self.session.cart_items().len();
        match key.code {
            KeyCode::Esc => self.screen = Screen::Dashboard,
            KeyCode::Char('b') => self.screen = Screen::Browse,
            KeyCode::Char('j') | KeyCode::Down => {
                if len > 0 {
                    self.cart.cursor = (self.cart.cursor + 1).min(len - 1);
                }
            }
            KeyCode::Char('k') | KeyCode::Up => self.cart.cursor = self.cart.cursor.saturating_sub(1),
            KeyCode::Enter | KeyCode::Char('u') => {
                if let Some(item) = self.session.cart_items().get(self.cart.cursor) {
                    let mut input = InputField::default();
                    input.set(item.quantity.to_string());
                    self.cart.modal = Some(CartModal::Quantity {
                        index: self.cart.cursor,
                        input,
                    });
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                match self.session.cart_remove(self.cart.cursor) {
                    Ok(item) => {
                        self.refresh_browse();
                        self.set_status(format!("Removed {} from cart", item.name));
                    }
                    Err(err) => self.set_status(format!("Cannot remove: {err}")),
                }
                self.clamp_cart_cursor();
            }
            KeyCode::Char('c') => {
                if len > 0 {
                    self.cart.modal = Some(CartModal::ConfirmClear);
                }
            }
            KeyCode::Char('o') => {
                if len > 0 {
                    self.screen = Screen::Checkout;
                    self.set_status("Review your order");
                } else {
                    self.set_status("Your cart is empty. Add items before checkout");
                }
            }
            _ => {}
        }
    }

    fn clamp_cart_cursor(&mut self) {
        let len = self.session.cart_items().len();
        if len == 0 {
            self.cart.cursor = 0;
        } else if self.cart.cursor >= len {
            self.cart.cursor = len - 1;
        }
    }

    fn handle_checkout_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => match self.session.checkout() {
                Ok(receipt) => {
                    self.refresh_browse();
                    let total = self.money(receipt.total);
                    self.enter_dashboard(format!(
                        "Purchase successful! Transaction {} ({total} charged)",
                        receipt.id
                    ));
                }
                Err(err @ SessionError::InsufficientFunds { .. }) => {
                    self.set_status(format!("{err}. Please fund your wallet."));
                    self.screen = Screen::Cart;
                }
                Err(err) => {
                    self.set_status(format!("Checkout failed: {err}"));
                    self.screen = Screen::Cart;
                }
            },
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.screen = Screen::Cart;
                self.set_status("Purchase cancelled");
            }
            _ => {}
        }
    }

    fn handle_history_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.screen = Screen::Dashboard,
            KeyCode::Char('j') | KeyCode::Down => self.history.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.history.move_cursor(-1),
            _ => {}
        }
    }

    fn handle_account_key(&mut self, key: KeyEvent) {
        if let Some(flow) = self.account.flow.take() {
            self.handle_account_flow_key(flow, key);
            return;
        }

        match key.code {
            KeyCode::Esc => self.screen = Screen::Dashboard,
            KeyCode::Char('j') | KeyCode::Down => {
                self.account.cursor = (self.account.cursor + 1).min(ACCOUNT_ITEMS.len() - 1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.account.cursor = self.account.cursor.saturating_sub(1);
            }
            KeyCode::Enter => match AccountOp::from_index(self.account.cursor) {
                Some(op) => {
                    self.account.flow = Some(AccountFlow {
                        op,
                        stage: AccountStage::Verify(InputField::masked()),
                    });
                    self.set_status("Enter your password to continue");
                }
                None => self.screen = Screen::Dashboard,
            },
            _ => {}
        }
    }

    fn handle_account_flow_key(&mut self, mut flow: AccountFlow, key: KeyEvent) {
        if key.code == KeyCode::Esc {
            self.set_status(format!("{} cancelled", flow.op.title()));
            return;
        }

        match flow.stage {
            AccountStage::Verify(ref mut input) => match key.code {
                KeyCode::Enter => {
                    let candidate = input.value().to_string();
                    match self.session.verify_password(&candidate) {
                        Ok(true) => {
                            flow.stage = next_stage_after_verify(flow.op);
                            self.account.flow = Some(flow);
                        }
                        Ok(false) => self.set_status("Incorrect password"),
                        Err(err) => self.set_status(format!("Error: {err}")),
                    }
                }
                _ => {
                    edit_field(input, key);
                    self.account.flow = Some(flow);
                }
            },
            AccountStage::NewValue(ref mut input) => match key.code {
                KeyCode::Enter => {
                    let value = input.value().to_string();
                    let result = match flow.op {
                        AccountOp::ChangeUsername => self.session.change_username(&value),
                        _ => self.session.change_email(&value),
                    };
                    match result {
                        Ok(()) => {
                            let noun = match flow.op {
                                AccountOp::ChangeUsername => "Username",
                                _ => "Email",
                            };
                            self.set_status(format!("{noun} updated successfully"));
                        }
                        Err(err) => {
                            self.set_status(format!("{err}"));
                            self.account.flow = Some(flow);
                        }
                    }
                }
                _ => {
                    edit_field(input, key);
                    self.account.flow = Some(flow);
                }
            },
            AccountStage::NewPassword {
                ref mut input,
                ref mut confirm,
                ref mut focus,
            } => match key.code {
                KeyCode::Tab | KeyCode::BackTab | KeyCode::Down | KeyCode::Up => {
                    *focus = (*focus + 1) % 2;
                    self.account.flow = Some(flow);
                }
                KeyCode::Enter => {
                    if *focus == 0 {
                        *focus = 1;
                        self.account.flow = Some(flow);
                    } else if input.value() != confirm.value() {
                        self.set_status("Passwords do not match");
                        self.account.flow = Some(flow);
                    } else {
                        let pending = input.value().to_string();
                        flow.stage = AccountStage::Confirm {
                            pending_password: Some(pending),
                        };
                        self.account.flow = Some(flow);
                    }
                }
                _ => {
                    let field = if *focus == 0 { input } else { confirm };
                    edit_field(field, key);
                    self.account.flow = Some(flow);
                }
            },
            AccountStage::Confirm {
                ref pending_password,
            } => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    let pending = pending_password.clone();
                    self.advance_confirmed(flow.op, pending);
                }
                KeyCode::Char('n') | KeyCode::Char('N') => {
                    self.set_status(format!("{} cancelled", flow.op.title()));
                }
                _ => self.account.flow = Some(flow),
            },
            AccountStage::TypedConfirm(ref mut input) => match key.code {
                KeyCode::Enter => {
                    let expected = typed_confirmation(flow.op);
                    if input.value() == expected {
                        self.apply_destructive(flow.op);
                    } else {
                        self.set_status(format!("{} cancelled", flow.op.title()));
                    }
                }
                _ => {
                    edit_field(input, key);
                    self.account.flow = Some(flow);
                }
            },
            AccountStage::Details => {
                // any key closes the details card
            }
        }
    }

    fn advance_confirmed(&mut self, op: AccountOp, pending_password: Option<String>) {
        match op {
            AccountOp::ChangePassword => {
                let Some(password) = pending_password else {
                    return;
                };
                match self.session.change_password(&password) {
                    Ok(()) => self.set_status("Password changed successfully"),
                    Err(err) => self.set_status(format!("Password change failed: {err}")),
                }
            }
            AccountOp::ResetBalance => {
                let balance = self
                    .session
                    .current()
                    .map(|account| account.balance)
                    .unwrap_or_default();
                if balance > LARGE_BALANCE_THRESHOLD {
                    self.account.flow = Some(AccountFlow {
                        op,
                        stage: AccountStage::TypedConfirm(InputField::default()),
                    });
                    self.set_status("Large balance: type RESET to confirm");
                    return;
                }
                self.apply_destructive(op);
            }
            AccountOp::DeleteAccount => {
                self.account.flow = Some(AccountFlow {
                    op,
                    stage: AccountStage::TypedConfirm(InputField::default()),
                });
                self.set_status("This cannot be undone: type DELETE to confirm");
            }
            _ => {}
        }
    }

    fn apply_destructive(&mut self, op: AccountOp) {
        match op {
            AccountOp::ResetBalance => match self.session.reset_balance() {
                Ok(()) => self.set_status("Balance reset to zero"),
                Err(err) => self.set_status(format!("Reset failed: {err}")),
            },
            AccountOp::DeleteAccount => match self.session.delete_account() {
                Ok(()) => {
                    self.refresh_browse();
                    self.screen = Screen::Start;
                    self.start_cursor = 0;
                    self.set_status("Account deleted");
                }
                Err(err) => self.set_status(format!("Delete failed: {err}")),
            },
            _ => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        match self.screen {
            Screen::Start => self.draw_start(frame),
            Screen::SignIn => self.draw_sign_in(frame),
            Screen::SignUp => self.draw_sign_up(frame),
            Screen::Dashboard => self.draw_dashboard(frame),
            Screen::FundWallet => self.draw_fund(frame),
            Screen::Browse => self.draw_browse(frame),
            Screen::Cart => self.draw_cart(frame),
            Screen::Checkout => self.draw_checkout(frame),
            Screen::History => self.draw_history(frame),
            Screen::Account => self.draw_account(frame),
        }
    }

    fn draw_start(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let banner_lines = block_font::render("SHOPTUI");
        let banner_height = banner_lines.len() as u16;
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length((banner_height + 2).min(area.height)),
                Constraint::Min(3),
                Constraint::Length(3),
            ])
            .split(area);

        let banner_content: Vec<Line> = banner_lines
            .into_iter()
            .map(|line| {
                Line::from(Span::styled(
                    line,
                    Style::default()
                        .fg(self.theme.accent)
                        .add_modifier(Modifier::BOLD),
                ))
            })
            .collect();
        let banner = Paragraph::new(banner_content).alignment(Alignment::Center);
        frame.render_widget(banner, layout[0]);

        let menu_height = (START_ITEMS.len() as u16 + 2).min(layout[1].height);
        let menu_area = centered_rect(28.min(layout[1].width.max(1)), menu_height, layout[1]);
        let menu_lines: Vec<Line> = START_ITEMS
            .iter()
            .enumerate()
            .map(|(idx, item)| self.menu_line(item, idx == self.start_cursor))
            .collect();
        let menu = Paragraph::new(menu_lines)
            .block(Block::default().borders(Borders::ALL).title("Welcome"))
            .alignment(Alignment::Center);
        frame.render_widget(menu, menu_area);

        self.render_status(frame, layout[2]);
    }

    fn menu_line(&self, item: &str, selected: bool) -> Line<'static> {
        if selected {
            Line::from(Span::styled(
                format!("▶ {item}"),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ))
        } else {
            Line::from(Span::styled(
                format!("  {item}"),
                Style::default().fg(self.theme.primary_fg),
            ))
        }
    }

    fn field_line(&self, label: &str, field: &InputField, focused: bool) -> Line<'static> {
        let style = if focused {
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.theme.primary_fg)
        };
        let mut text = field.display();
        if focused {
            text.push('█');
        }
        Line::from(vec![
            Span::styled(format!("{label:<10}"), Style::default().fg(self.theme.muted)),
            Span::styled(text, style),
        ])
    }

    fn draw_sign_in(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(3)])
            .split(area);

        let form_area = centered_rect(46.min(area.width), 8, chunks[0]);
        let lines = vec![
            self.field_line("Identity", &self.sign_in.identity, self.sign_in.focus == 0),
            self.field_line("Password", &self.sign_in.password, self.sign_in.focus == 1),
            Line::from(""),
            Line::from(Span::styled(
                "Tab switches fields · Enter submits · Esc backs out",
                Style::default().fg(self.theme.muted),
            )),
        ];
        let form = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Sign In"))
            .wrap(Wrap { trim: true });
        frame.render_widget(form, form_area);
        self.render_status(frame, chunks[1]);
    }

    fn draw_sign_up(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(3)])
            .split(area);

        let form_area = centered_rect(56.min(area.width), 11, chunks[0]);
        let password_line = if self.sign_up.reveal_password {
            let mut text = self.sign_up.password.value().to_string();
            if self.sign_up.focus == 2 {
                text.push('█');
            }
            Line::from(vec![
                Span::styled("Password  ", Style::default().fg(self.theme.muted)),
                Span::styled(text, Style::default().fg(self.theme.warning)),
            ])
        } else {
            self.field_line("Password", &self.sign_up.password, self.sign_up.focus == 2)
        };

        let lines = vec![
            self.field_line("Username", &self.sign_up.username, self.sign_up.focus == 0),
            self.field_line("Email", &self.sign_up.email, self.sign_up.focus == 1),
            password_line,
            Line::from(""),
            Line::from(Span::styled(
                "At least 16 chars with upper, lower, digit and #?!@$%^&*-",
                Style::default().fg(self.theme.muted),
            )),
            Line::from(Span::styled(
                "Ctrl-G generates one · Tab switches · Enter submits · Esc backs out",
                Style::default().fg(self.theme.muted),
            )),
        ];
        let form = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Create Account"))
            .wrap(Wrap { trim: true });
        frame.render_widget(form, form_area);
        self.render_status(frame, chunks[1]);
    }

    fn draw_dashboard(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let username = self
            .session
            .current()
            .map(|account| account.username.clone())
            .unwrap_or_default();
        let balance = self
            .session
            .current()
            .map(|account| account.balance)
            .unwrap_or_default();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(area);

        let header = Paragraph::new(vec![
            Line::from(Span::styled(
                format!("Welcome, {username}"),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("Balance: {}", self.money(balance)),
                Style::default().fg(self.theme.success),
            )),
        ])
        .block(Block::default().borders(Borders::ALL).title("Dashboard"))
        .alignment(Alignment::Center);
        frame.render_widget(header, chunks[0]);

        let menu_height = (DASH_ITEMS.len() as u16 + 2).min(chunks[1].height);
        let menu_area = centered_rect(32.min(chunks[1].width.max(1)), menu_height, chunks[1]);
        let menu_lines: Vec<Line> = DASH_ITEMS
            .iter()
            .enumerate()
            .map(|(idx, item)| self.menu_line(item, idx == self.dash_cursor))
            .collect();
        let menu = Paragraph::new(menu_lines)
            .block(Block::default().borders(Borders::ALL).title("Menu"))
            .alignment(Alignment::Center);
        frame.render_widget(menu, menu_area);

        self.render_status(frame, chunks[2]);
    }

    fn draw_fund(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(3)])
            .split(area);

        let balance = self
            .session
            .current()
            .map(|account| account.balance)
            .unwrap_or_default();

        let mut lines = vec![
            Line::from(Span::styled(
                format!("Current balance: {}", self.money(balance)),
                Style::default().fg(self.theme.success),
            )),
            Line::from(""),
        ];
        for (idx, preset) in FUND_PRESETS.iter().enumerate() {
            lines.push(self.menu_line(&self.money(*preset), idx == self.fund.cursor));
        }
        lines.push(self.menu_line("Custom Amount", self.fund.cursor == FUND_PRESETS.len()));

        let list_area = centered_rect(40.min(area.width), 11, chunks[0]);
        let list = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Fund Wallet"))
            .alignment(Alignment::Left);
        frame.render_widget(list, list_area);

        if let Some(input) = &self.fund.custom {
            let modal_area = centered_rect(40.min(area.width), 5, area);
            frame.render_widget(Clear, modal_area);
            let mut text = input.display();
            text.push('█');
            let modal = Paragraph::new(vec![
                Line::from(Span::raw(text)),
                Line::from(Span::styled(
                    "Enter confirms · Esc cancels",
                    Style::default().fg(self.theme.muted),
                )),
            ])
            .block(Block::default().borders(Borders::ALL).title("Custom Amount"));
            frame.render_widget(modal, modal_area);
        }

        self.render_status(frame, chunks[1]);
    }

    fn draw_browse(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(8), Constraint::Length(3)])
            .split(size);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(chunks[0]);

        self.browse.list_height = body[0].height.saturating_sub(2) as usize;
        self.browse.ensure_cursor_visible();

        let visible_end = (self.browse.offset + self.browse.list_height.max(1))
            .min(self.browse.products.len());
        let mut list_lines: Vec<Line> = Vec::new();
        if self.browse.products.is_empty() {
            list_lines.push(Line::from(Span::styled(
                "No matching products",
                Style::default().fg(self.theme.muted),
            )));
        }
        for (idx, product) in self.browse.products[self.browse.offset..visible_end]
            .iter()
            .enumerate()
        {
            let absolute = self.browse.offset + idx;
            let marker = if absolute == self.browse.cursor {
                Span::styled("▶ ", Style::default().fg(self.theme.accent))
            } else {
                Span::raw("  ")
            };
            let style = if absolute == self.browse.cursor {
                Style::default().bg(self.theme.selection_bg)
            } else {
                Style::default()
            };
            list_lines.push(Line::from(vec![
                marker,
                Span::styled(product.name.clone(), style),
            ]));
        }

        let title = if self.browse.filter.is_empty() {
            "Products".to_string()
        } else {
            format!("Products · search: {}", self.browse.filter)
        };
        let list = Paragraph::new(list_lines)
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(list, body[0]);

        let detail_lines = match self.browse.current() {
            Some(product) => vec![
                Line::from(Span::styled(
                    product.name.clone(),
                    Style::default()
                        .fg(self.theme.accent)
                        .add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(format!("Price: {}", self.money(product.price))),
                Line::from(match product.stock {
                    0 => Span::styled("Out of stock", Style::default().fg(self.theme.danger)),
                    stock => Span::styled(
                        format!("In stock: {stock}"),
                        Style::default().fg(self.theme.success),
                    ),
                }),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter adds one to your cart",
                    Style::default().fg(self.theme.muted),
                )),
            ],
            None => vec![Line::from("Nothing selected")],
        };
        let details = Paragraph::new(detail_lines)
            .block(Block::default().borders(Borders::ALL).title("Details"))
            .wrap(Wrap { trim: true });
        frame.render_widget(details, body[1]);

        self.render_status(frame, chunks[1]);
    }

    fn draw_cart(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(6),
                Constraint::Length(4),
                Constraint::Length(3),
            ])
            .split(size);

        let items = self.session.cart_items();
        let mut lines: Vec<Line> = Vec::new();
        if items.is_empty() {
            lines.push(Line::from(Span::styled(
                "Your cart is empty",
                Style::default().fg(self.theme.muted),
            )));
        }
        for (idx, item) in items.iter().enumerate() {
            let marker = if idx == self.cart.cursor {
                Span::styled("▶ ", Style::default().fg(self.theme.accent))
            } else {
                Span::raw("  ")
            };
            lines.push(Line::from(vec![
                marker,
                Span::raw(format!(
                    "{}. {} x{} - {}",
                    idx + 1,
                    item.name,
                    item.quantity,
                    self.money(item.line_total())
                )),
            ]));
        }
        let cart_list = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Your Cart"));
        frame.render_widget(cart_list, chunks[0]);

        let summary = Paragraph::new(vec![
            Line::from(Span::styled(
                format!("Cart Total: {}", self.money(self.session.cart_total())),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Enter/u edit quantity · d remove · c clear · o checkout · b browse · Esc back",
                Style::default().fg(self.theme.muted),
            )),
        ])
        .block(Block::default().borders(Borders::ALL).title("Summary"));
        frame.render_widget(summary, chunks[1]);

        match &self.cart.modal {
            Some(CartModal::Quantity { input, .. }) => {
                let modal_area = centered_rect(36.min(size.width), 5, size);
                frame.render_widget(Clear, modal_area);
                let mut text = input.display();
                text.push('█');
                let modal = Paragraph::new(vec![
                    Line::from(Span::raw(text)),
                    Line::from(Span::styled(
                        "Enter confirms · Esc cancels",
                        Style::default().fg(self.theme.muted),
                    )),
                ])
                .block(Block::default().borders(Borders::ALL).title("New Quantity"));
                frame.render_widget(modal, modal_area);
            }
            Some(CartModal::ConfirmClear) => {
                let modal_area = centered_rect(44.min(size.width), 4, size);
                frame.render_widget(Clear, modal_area);
                let modal = Paragraph::new(vec![Line::from(
                    "Clear the cart and release all reservations? (y/n)",
                )])
                .block(Block::default().borders(Borders::ALL).title("Clear Cart"))
                .wrap(Wrap { trim: true });
                frame.render_widget(modal, modal_area);
            }
            None => {}
        }

        self.render_status(frame, chunks[2]);
    }

    fn draw_checkout(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(3)])
            .split(size);

        let total = self.session.cart_total();
        let balance = self
            .session
            .current()
            .map(|account| account.balance)
            .unwrap_or_default();
        let after = balance - total;

        let after_style = if after < 0.0 {
            Style::default().fg(self.theme.danger)
        } else {
            Style::default().fg(self.theme.success)
        };

        let box_area = centered_rect(46.min(size.width), 9, chunks[0]);
        let summary = Paragraph::new(vec![
            Line::from(format!("Items: {}", self.session.cart_items().len())),
            Line::from(format!("Total Amount: {}", self.money(total))),
            Line::from(format!("Your Balance: {}", self.money(balance))),
            Line::from(Span::styled(
                format!("Balance After Purchase: {}", self.money(after)),
                after_style,
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Confirm purchase? (y/n)",
                Style::default()
                    .fg(self.theme.warning)
                    .add_modifier(Modifier::BOLD),
            )),
        ])
        .block(Block::default().borders(Borders::ALL).title("Order Summary"))
        .alignment(Alignment::Left);
        frame.render_widget(summary, box_area);

        self.render_status(frame, chunks[1]);
    }

    fn draw_history(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(6), Constraint::Length(3)])
            .split(size);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[0]);

        self.history.list_height = body[0].height.saturating_sub(2) as usize;

        let mut lines: Vec<Line> = Vec::new();
        if self.history.receipts.is_empty() {
            lines.push(Line::from(Span::styled(
                "No orders yet",
                Style::default().fg(self.theme.muted),
            )));
        }
        let end = (self.history.offset + self.history.list_height.max(1))
            .min(self.history.receipts.len());
        for (idx, receipt) in self.history.receipts[self.history.offset..end]
            .iter()
            .enumerate()
        {
            let absolute = self.history.offset + idx;
            let marker = if absolute == self.history.cursor {
                Span::styled("▶ ", Style::default().fg(self.theme.accent))
            } else {
                Span::raw("  ")
            };
            let timestamp = receipt.created_at.format("%Y-%m-%d %H:%M");
            lines.push(Line::from(vec![
                marker,
                Span::raw(format!(
                    "{} [{}] {}",
                    receipt.id,
                    timestamp,
                    self.money(receipt.total)
                )),
            ]));
        }
        let list = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Order History"));
        frame.render_widget(list, body[0]);

        let detail_lines = match self.history.receipts.get(self.history.cursor) {
            Some(receipt) => {
                let mut detail = vec![
                    Line::from(Span::styled(
                        receipt.id.clone(),
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    )),
                    Line::from(""),
                ];
                for item in &receipt.items {
                    detail.push(Line::from(format!(
                        "{} x{} - {}",
                        item.name,
                        item.quantity,
                        self.money(item.line_total())
                    )));
                }
                detail.push(Line::from(""));
                detail.push(Line::from(format!("Total: {}", self.money(receipt.total))));
                detail.push(Line::from(format!(
                    "Balance after: {}",
                    self.money(receipt.balance_after)
                )));
                detail
            }
            None => vec![Line::from("Nothing selected")],
        };
        let details = Paragraph::new(detail_lines)
            .block(Block::default().borders(Borders::ALL).title("Receipt"))
            .wrap(Wrap { trim: true });
        frame.render_widget(details, body[1]);

        self.render_status(frame, chunks[1]);
    }

    fn draw_account(&mut self, frame: &mut Frame) {
        let size = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(3)])
            .split(size);

        let menu_height = (ACCOUNT_ITEMS.len() as u16 + 2).min(chunks[0].height);
        let menu_area = centered_rect(34.min(size.width.max(1)), menu_height, chunks[0]);
        let menu_lines: Vec<Line> = ACCOUNT_ITEMS
            .iter()
            .enumerate()
            .map(|(idx, item)| self.menu_line(item, idx == self.account.cursor))
            .collect();
        let menu = Paragraph::new(menu_lines)
            .block(Block::default().borders(Borders::ALL).title("Manage Account"))
            .alignment(Alignment::Left);
        frame.render_widget(menu, menu_area);

        if let Some(flow) = &self.account.flow {
            self.render_account_flow(frame, size, flow);
        }

        self.render_status(frame, chunks[1]);
    }

    fn render_account_flow(&self, frame: &mut Frame, area: Rect, flow: &AccountFlow) {
        let title = flow.op.title();
        let lines: Vec<Line> = match &flow.stage {
            AccountStage::Verify(input) => vec![
                Line::from("Enter your password to verify:"),
                Line::from(Span::raw(format!("{}█", input.display()))),
            ],
            AccountStage::NewValue(input) => {
                let label = match flow.op {
                    AccountOp::ChangeUsername => "New username:",
                    _ => "New email:",
                };
                vec![
                    Line::from(label),
                    Line::from(Span::raw(format!("{}█", input.display()))),
                ]
            }
            AccountStage::NewPassword {
                input,
                confirm,
                focus,
            } => vec![
                Line::from(format!(
                    "New password:     {}{}",
                    input.display(),
                    if *focus == 0 { "█" } else { "" }
                )),
                Line::from(format!(
                    "Confirm password: {}{}",
                    confirm.display(),
                    if *focus == 1 { "█" } else { "" }
                )),
                Line::from(Span::styled(
                    "At least 16 chars with upper, lower, digit and #?!@$%^&*-",
                    Style::default().fg(self.theme.muted),
                )),
            ],
            AccountStage::Confirm { .. } => {
                let question = match flow.op {
                    AccountOp::ChangePassword => "Apply the new password? (y/n)".to_string(),
                    AccountOp::ResetBalance => {
                        let balance = self
                            .session
                            .current()
                            .map(|account| account.balance)
                            .unwrap_or_default();
                        format!(
                            "Reset your balance of {} to zero? (y/n)",
                            self.money(balance)
                        )
                    }
                    AccountOp::DeleteAccount => {
                        let balance = self
                            .session
                            .current()
                            .map(|account| account.balance)
                            .unwrap_or_default();
                        if balance > 0.0 {
                            format!(
                                "Delete your account? {} in your wallet will be lost. (y/n)",
                                self.money(balance)
                            )
                        } else {
                            "Delete your account? This cannot be undone. (y/n)".to_string()
                        }
                    }
                    _ => "Continue? (y/n)".to_string(),
                };
                vec![Line::from(Span::styled(
                    question,
                    Style::default().fg(self.theme.warning),
                ))]
            }
            AccountStage::TypedConfirm(input) => {
                let expected = typed_confirmation(flow.op);
                vec![
                    Line::from(Span::styled(
                        format!("Type {expected} to confirm:"),
                        Style::default().fg(self.theme.danger),
                    )),
                    Line::from(Span::raw(format!("{}█", input.display()))),
                ]
            }
            AccountStage::Details => {
                let account = self.session.current();
                match account {
                    Some(account) => vec![
                        Line::from(format!("Username:  {}", account.username)),
                        Line::from(format!("Email:     {}", account.email)),
                        Line::from(format!("Balance:   {}", self.money(account.balance))),
                        Line::from(""),
                        Line::from(Span::styled(
                            "Press any key to close",
                            Style::default().fg(self.theme.muted),
                        )),
                    ],
                    None => vec![Line::from("Not signed in")],
                }
            }
        };

        let height = (lines.len() as u16 + 2).min(area.height);
        let modal_area = centered_rect(52.min(area.width), height, area);
        frame.render_widget(Clear, modal_area);
        let modal = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: true });
        frame.render_widget(modal, modal_area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let primary = if self.screen == Screen::Browse && self.browse.mode == BrowseMode::Filter {
            format!("Search: {}", self.browse.filter)
        } else {
            self.status.clone()
        };
        let secondary = match self.session.current() {
            Some(account) => format!(
                "Signed in as {} · {} cart line(s) · balance {}",
                account.username,
                self.session.cart_items().len(),
                self.money(account.balance)
            ),
            None => "Not signed in".to_string(),
        };
        let paragraph = Paragraph::new(vec![Line::from(primary), Line::from(secondary)])
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn next_stage_after_verify(op: AccountOp) -> AccountStage {
    match op {
        AccountOp::ChangeUsername | AccountOp::ChangeEmail => {
            AccountStage::NewValue(InputField::default())
        }
        AccountOp::ChangePassword => AccountStage::NewPassword {
            input: InputField::masked(),
            confirm: InputField::masked(),
            focus: 0,
        },
        AccountOp::ViewDetails => AccountStage::Details,
        AccountOp::ResetBalance | AccountOp::DeleteAccount => AccountStage::Confirm {
            pending_password: None,
        },
    }
}

fn typed_confirmation(op: AccountOp) -> &'static str {
    match op {
        AccountOp::ResetBalance => "RESET",
        _ => "DELETE",
    }
}

fn edit_field(field: &mut InputField, key: KeyEvent) {
    match key.code {
        KeyCode::Left => field.move_cursor(-1),
        KeyCode::Right => field.move_cursor(1),
        KeyCode::Home => field.move_home(),
        KeyCode::End => field.move_end(),
        KeyCode::Backspace => field.backspace(),
        KeyCode::Delete => field.delete(),
        KeyCode::Char(ch) => {
            if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                field.insert(ch);
            }
        }
        _ => {}
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn format_amount(value: f64) -> String {
    let cents = (value * 100.0).round() as i128;
    let (sign, cents) = if cents < 0 { ("-", -cents) } else { ("", cents) };
    let whole = (cents / 100).to_string();
    let frac = cents % 100;
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}.{frac:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_group_thousands() {
        assert_eq!(format_amount(0.0), "0.00");
        assert_eq!(format_amount(4500.0), "4,500.00");
        assert_eq!(format_amount(1_234_567.89), "1,234,567.89");
        assert_eq!(format_amount(-20_000.5), "-20,000.50");
        assert_eq!(format_amount(999.999), "1,000.00");
    }

    #[test]
    fn input_field_edits_around_cursor() {
        let mut field = InputField::default();
        for ch in "adaa".chars() {
            field.insert(ch);
        }
        field.move_cursor(-1);
        field.backspace();
        assert_eq!(field.value(), "ada");
        field.move_end();
        field.insert('!');
        assert_eq!(field.value(), "ada!");
        field.move_home();
        field.delete();
        assert_eq!(field.value(), "da!");
    }

    #[test]
    fn masked_fields_hide_their_value() {
        let mut field = InputField::masked();
        for ch in "secret".chars() {
            field.insert(ch);
        }
        assert_eq!(field.display(), "••••••");
        assert_eq!(field.value(), "secret");
    }
}
