use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use mamar_bank::money::format_amount;
use mamar_bank::{Address, Transaction, TransactionReport, TransactionType};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const PAGE_SIZE: usize = 20;

pub struct App {
    pub statement: TransactionReport,
    pub address: Option<Address>,
    pub filtered: Vec<Transaction>,
    pub filter: Option<TransactionType>,
    pub state: TableState,
    pub show_detail: bool,
}

impl App {
    pub fn new(statement: TransactionReport, address: Option<Address>) -> Self {
        let mut state = TableState::default();
        if !statement.transactions.is_empty() {
            state.select(Some(0));
        }

        let filtered = statement.transactions.clone();

        Self {
            statement,
            address,
            filtered,
            filter: None,
            state,
            show_detail: false,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_transaction(&self) -> Option<&Transaction> {
        self.state.selected().and_then(|i| self.filtered.get(i))
    }

    /// `None` shows every entry
    pub fn apply_filter(&mut self, filter: Option<TransactionType>) {
        self.filter = filter;
        self.filtered = self
            .statement
            .transactions
            .iter()
            .filter(|tx| filter.map_or(true, |t| tx.transaction_type == t))
            .cloned()
            .collect();

        if self.filtered.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(0));
        }
    }

    pub fn next(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            return;
        }
        let i = self
            .state
            .selected()
            .map_or(0, |i| (i + PAGE_SIZE).min(len - 1));
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.filtered.is_empty() {
            return;
        }
        let i = self.state.selected().map_or(0, |i| i.saturating_sub(PAGE_SIZE));
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Char('0') => app.apply_filter(None),
                KeyCode::Char(c @ '1'..='5') => {
                    let code = c as i64 - '0' as i64;
                    app.apply_filter(TransactionType::from_code(code));
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home if !app.filtered.is_empty() => app.state.select(Some(0)),
                KeyCode::End if !app.filtered.is_empty() => {
                    app.state.select(Some(app.filtered.len() - 1));
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Account header
            Constraint::Min(0),
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content[0], app);
        render_detail_panel(f, content[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn type_color(tx_type: TransactionType) -> Color {
    match tx_type {
        TransactionType::Deposit => Color::Green,
        TransactionType::Withdrawal => Color::Red,
        TransactionType::Loan => Color::Yellow,
        TransactionType::LoanPaid => Color::Magenta,
        TransactionType::Transfer => Color::Cyan,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let account = &app.statement.account;

    let mut spans = vec![
        Span::styled(
            format!("Account {}", account.account_no),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" │ "),
        Span::styled(account.account_type.as_str(), Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled(
            format!("Balance: {}$", format_amount(app.statement.balance)),
            Style::default().fg(if account.is_overdrawn() { Color::Red } else { Color::Green }),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Entries: {}", app.statement.transactions.len()),
            Style::default().fg(Color::White),
        ),
    ];
    if let Some(address) = &app.address {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(address.one_line(), Style::default().fg(Color::DarkGray)));
    }

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["#", "Timestamp", "Type", "Amount", "Balance After", "Loan"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));

    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray)).height(1);

    let rows = app.filtered.iter().map(|tx| {
        let color = type_color(tx.transaction_type);
        let loan = match tx.transaction_type {
            _ if tx.is_outstanding_loan() => "approved",
            TransactionType::Loan => "pending",
            _ => "",
        };

        Row::new(vec![
            Cell::from(tx.id.to_string()),
            Cell::from(tx.timestamp.format("%Y-%m-%d %H:%M").to_string()),
            Cell::from(tx.transaction_type.label()).style(Style::default().fg(color)),
            Cell::from(format_amount(tx.amount)).style(Style::default().fg(color)),
            Cell::from(format_amount(tx.balance_after_transaction)),
            Cell::from(loan),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(18),
            Constraint::Length(16),
            Constraint::Length(14),
            Constraint::Length(16),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Statement "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.filtered.len()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(filter) = app.filter {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            format!("Filter: {}", filter.label()),
            Style::default().fg(Color::Green),
        ));
        spans.push(Span::raw(" ("));
        spans.push(Span::styled("0", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(" clear)"));
    }

    spans.push(Span::raw(" | "));
    spans.push(Span::styled("1-5", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Type | "));
    spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Details | "));
    spans.push(Span::styled("j/k", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Nav | "));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn detail_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("  {}: ", label),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Transaction Details ");

    let tx = match app.selected_transaction() {
        Some(tx) => tx,
        None => {
            f.render_widget(Paragraph::new("No transaction selected").block(block), area);
            return;
        }
    };

    let mut content = vec![
        Line::from(""),
        detail_line("ID", tx.id.to_string()),
        detail_line("Timestamp", tx.timestamp.to_rfc3339()),
        detail_line("Type", tx.transaction_type.label().to_string()),
        detail_line("Amount", format!("{}$", format_amount(tx.amount))),
        detail_line("Balance after", format!("{}$", format_amount(tx.balance_after_transaction))),
    ];

    if tx.transaction_type == TransactionType::Loan {
        let status = if tx.is_pending_loan() { "pending approval" } else { "approved" };
        content.push(detail_line("Loan", status.to_string()));
    }
    if let Some(to) = tx.transfer_account_no {
        content.push(detail_line("Sent to", to.to_string()));
    }

    f.render_widget(Paragraph::new(content).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use mamar_bank::{report, Account, AccountType, DateRange, Gender};
    use rust_decimal::Decimal;

    fn entry(id: i64, tx_type: TransactionType) -> Transaction {
        Transaction {
            id,
            account_id: 1,
            amount: Decimal::new(1000, 2),
            balance_after_transaction: Decimal::new(1000 * id, 2),
            transaction_type: tx_type,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, id as u32, 0).unwrap(),
            loan_approved: false,
            transfer_account_no: None,
        }
    }

    fn test_app() -> App {
        let account = Account {
            id: 1,
            owner_id: 1,
            account_type: AccountType::Savings,
            gender: Gender::Male,
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            account_no: 100_001,
            balance: Decimal::new(3000, 2),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let entries = vec![
            entry(1, TransactionType::Deposit),
            entry(2, TransactionType::Loan),
            entry(3, TransactionType::Deposit),
        ];
        let address = Address {
            owner_id: 1,
            street_address: "3 Kazi Nazrul Avenue".to_string(),
            city: "Dhaka".to_string(),
            postal_code: 1000,
            country: "Bangladesh".to_string(),
        };
        App::new(report::build(account, DateRange::default(), entries), Some(address))
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = test_app();
        assert_eq!(app.state.selected(), Some(0));

        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));

        app.page_down();
        assert_eq!(app.state.selected(), Some(2));
        app.page_up();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_filter_by_type() {
        let mut app = test_app();

        app.apply_filter(Some(TransactionType::Deposit));
        assert_eq!(app.filtered.len(), 2);
        assert!(app.filtered.iter().all(|tx| tx.transaction_type == TransactionType::Deposit));

        app.apply_filter(Some(TransactionType::Transfer));
        assert!(app.filtered.is_empty());
        assert_eq!(app.state.selected(), None);
        assert!(app.selected_transaction().is_none());

        app.apply_filter(None);
        assert_eq!(app.filtered.len(), 3);
        assert_eq!(app.selected_transaction().map(|tx| tx.id), Some(1));
    }
}
