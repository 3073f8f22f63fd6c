//! Application state and page flows.
//!
//! Each loop iteration renders the page for the router's current location.
//! Protected pages are wrapped in an [`AccessGate`]; when the session goes
//! away mid-page (logout, or a 401 from any call) the gate replaces the
//! location with the login page and the page returns early.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use budget_core::models::{format_month, BudgetCreate, CategoryCreate, TransactionType};
use budget_core::{AccessGate, ApiClient, ApiError, GateState, Navigator, Session, SessionStore};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::router::{Route, Router};

/// Maximum length for username input
const MAX_USERNAME_LENGTH: usize = 50;

pub struct App {
    pub config: Config,
    pub session: Arc<SessionStore>,
    pub api: ApiClient,
    pub router: Arc<Router>,
    session_rx: watch::Receiver<Session>,
    running: bool,
}

/// What the user typed at a page prompt
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Select(usize),
    Back,
    NewBudget,
    NewCategory,
    Logout,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Ok(n) = input.parse::<usize>() {
            return Command::Select(n);
        }
        match input.to_ascii_lowercase().as_str() {
            "b" | "back" => Command::Back,
            "n" | "new" => Command::NewBudget,
            "c" | "category" => Command::NewCategory,
            "l" | "logout" => Command::Logout,
            "q" | "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Turn an API failure into the message a page shows
fn user_message(context: &str, err: &ApiError) -> String {
    match err {
        ApiError::Unauthorized => "Session expired. Please log in again.".to_string(),
        ApiError::NetworkError(_) => {
            "Unable to connect to server. Check your internet connection.".to_string()
        }
        ApiError::RateLimited => "Server is busy. Please wait a moment and try again.".to_string(),
        ApiError::Validation(msg) => format!("{}: {}", context, msg),
        _ => context.to_string(),
    }
}

fn can_add_username_char(current_len: usize, c: char) -> bool {
    current_len < MAX_USERNAME_LENGTH && !c.is_control()
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

impl App {
    pub fn new(config: Config, session: Arc<SessionStore>, api: ApiClient, router: Arc<Router>) -> Self {
        // Bridge session transitions into something a page can await
        let (tx, session_rx) = watch::channel(session.snapshot());
        session.subscribe(move |s: &Session| {
            tx.send_replace(s.clone());
        });

        Self {
            config,
            session,
            api,
            router,
            session_rx,
            running: true,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        while self.running {
            let route = self.router.route();
            debug!(?route, depth = self.router.depth(), "Rendering");

            if !route.is_protected() {
                self.login_page().await?;
                continue;
            }

            let gate = AccessGate::mount(Arc::clone(&self.session), self.router.clone());
            match gate.state() {
                GateState::Pending => self.wait_until_ready().await,
                GateState::Unauthorized => {}
                GateState::Authorized => self.protected_page(route, &gate).await?,
            }
        }
        Ok(())
    }

    /// Nothing is rendered until the persisted credential has been checked
    async fn wait_until_ready(&mut self) {
        if self.session_rx.wait_for(|s| s.ready).await.is_err() {
            warn!("Session store went away before it was ready");
            self.running = false;
        }
    }

    async fn protected_page(&mut self, route: Route, gate: &AccessGate) -> Result<()> {
        if let Some(subject) = gate.render(|| self.session.subject()).flatten() {
            println!("\n[{}]  {}", subject, self.router.current());
        }

        match route {
            Route::Dashboard => self.dashboard_page().await,
            Route::MonthBudgets(month) => self.month_page(&month).await,
            Route::NewBudget => self.new_budget_page().await,
            Route::NewCategory => self.new_category_page().await,
            Route::NotFound(path) => {
                warn!(%path, "Unknown route");
                self.router.replace("/dashboard");
                Ok(())
            }
            Route::Login => Ok(()),
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    async fn login_page(&mut self) -> Result<()> {
        // A restored session skips the login prompt entirely
        if !self.session_rx.borrow().ready {
            self.wait_until_ready().await;
            return Ok(());
        }
        if self.session_rx.borrow().is_authenticated() {
            self.router.replace("/dashboard");
            return Ok(());
        }

        println!("\n=== Budget Tool Login ===\n");
        let username = match self.config.last_username.clone() {
            Some(last) => {
                let input = prompt(&format!("Username [{}] (q to quit): ", last))?;
                if input.is_empty() {
                    last
                } else {
                    input
                }
            }
            None => prompt("Username (q to quit): ")?,
        };

        if username.is_empty() || username == "q" {
            self.running = false;
            return Ok(());
        }
        if !username.chars().enumerate().all(|(i, c)| can_add_username_char(i, c)) {
            println!("Invalid username");
            return Ok(());
        }

        let password = rpassword::prompt_password("Password: ")?;
        if password.is_empty() {
            println!("Username and password required");
            return Ok(());
        }

        match self.api.login(&username, &password).await {
            Ok(token) => {
                self.session.login(&token);
                self.config.last_username = Some(username);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                info!("Login successful");
                self.router.push("/dashboard");
            }
            Err(ApiError::Unauthorized) => println!("Invalid username or password"),
            Err(e) => {
                error!(error = %e, "Login failed");
                println!("{}", user_message("Login failed", &e));
            }
        }
        Ok(())
    }

    /// Log in with the demo account credential
    pub async fn login_demo(&mut self) -> Result<()> {
        let token = self.api.demo_token().await?;
        self.session.login(&token);
        self.router.push("/dashboard");
        Ok(())
    }

    fn logout(&mut self) {
        // The gate observes this and sends us to the login page
        self.session.logout();
    }

    // =========================================================================
    // Pages
    // =========================================================================

    async fn dashboard_page(&mut self) -> Result<()> {
        let fetched = futures::try_join!(self.api.fetch_months(), self.api.fetch_categories());
        let months = match fetched {
            Ok((months, categories)) => {
                println!("\nAvailable Budget Months ({} categories)", categories.len());
                months
            }
            Err(ApiError::Unauthorized) => return Ok(()),
            Err(e) => {
                error!(error = %e, "Failed to load months");
                println!("{}", user_message("Failed to load available months.", &e));
                Vec::new()
            }
        };

        for (i, month) in months.iter().enumerate() {
            println!("  {}. {}", i + 1, month.display);
        }
        if months.is_empty() {
            println!("  No budgets yet.");
        }

        let input = prompt("\n[#] open month  [n]ew budget  new [c]ategory  [l]ogout  [q]uit > ")?;
        match Command::parse(&input) {
            Command::Select(n) if n >= 1 && n <= months.len() => {
                self.router.push(&format!("/budgets/{}", months[n - 1].value));
            }
            Command::NewBudget => self.router.push("/budgets/new"),
            Command::NewCategory => self.router.push("/categories/new"),
            Command::Logout => self.logout(),
            Command::Quit => self.running = false,
            other => println!("Unknown choice: {:?}", other),
        }
        Ok(())
    }

    async fn month_page(&mut self, month: &str) -> Result<()> {
        let title = format_month(month).unwrap_or_else(|| month.to_string());
        println!("\nBudgets for {}", title);

        match self.api.fetch_budgets_for_month(month).await {
            Ok(budgets) if budgets.is_empty() => println!("  No budgets found for this month."),
            Ok(budgets) => {
                for budget in &budgets {
                    println!("  {}: {}", budget.category.name, budget.display_value());
                }
            }
            Err(ApiError::Unauthorized) => return Ok(()),
            Err(e) => {
                error!(error = %e, month, "Failed to load budgets");
                println!("{}", user_message(&format!("Failed to load budgets for {}", month), &e));
            }
        }

        let input = prompt("\n[b]ack  [l]ogout  [q]uit > ")?;
        match Command::parse(&input) {
            Command::Back => {
                self.router.back();
            }
            Command::Logout => self.logout(),
            Command::Quit => self.running = false,
            other => println!("Unknown choice: {:?}", other),
        }
        Ok(())
    }

    async fn new_budget_page(&mut self) -> Result<()> {
        let categories = match self.api.fetch_categories().await {
            Ok(categories) => categories,
            Err(ApiError::Unauthorized) => return Ok(()),
            Err(e) => {
                println!("{}", user_message("Failed to load categories", &e));
                self.router.back();
                return Ok(());
            }
        };

        println!("\nCreate Budget");
        if categories.is_empty() {
            println!("  No categories yet, create one first.");
            self.router.replace("/categories/new");
            return Ok(());
        }
        for (i, category) in categories.iter().enumerate() {
            println!("  {}. {} ({})", i + 1, category.name, category.kind);
        }

        let category_id = match prompt("Category #: ")?.parse::<usize>() {
            Ok(n) if n >= 1 && n <= categories.len() => Some(categories[n - 1].id),
            _ => None,
        };
        let value = prompt("Value: ")?.parse::<f64>().unwrap_or(-1.0);
        let month = prompt("Month (YYYY-MM): ")?;

        let draft = BudgetCreate {
            value,
            month,
            category_id,
        };
        match self.api.create_budget(&draft).await {
            Ok(budget) => {
                info!(id = budget.id, "Budget created");
                println!("Budget created");
                self.router.back();
            }
            Err(ApiError::Unauthorized) => {}
            Err(e) => {
                error!(error = %e, "Failed to create budget");
                println!("{}", user_message("Error creating budget", &e));
            }
        }
        Ok(())
    }

    async fn new_category_page(&mut self) -> Result<()> {
        println!("\nCreate Category");
        let name = prompt("Name: ")?;
        let kind = match prompt("Type [income/expense]: ")?.parse::<TransactionType>() {
            Ok(kind) => kind,
            Err(e) => {
                println!("{}", e);
                return Ok(());
            }
        };

        match self.api.create_category(&CategoryCreate { name, kind }).await {
            Ok(category) => {
                info!(id = category.id, "Category created");
                println!("Category \"{}\" created", category.name);
                self.router.back();
            }
            Err(ApiError::Unauthorized) => {}
            Err(e) => {
                error!(error = %e, "Failed to create category");
                println!("{}", user_message("Error creating category", &e));
            }
        }
        Ok(())
    }
}
