//! Commands, Menus and Texts
//!
//! Commands: /start, /help, /send, /status, /privacy, /about
//! Admin commands: /broadcast <text>, /restart
//!
//! Inline keyboard payloads are parsed into `Callback`.

use crate::admin::PrivilegedAction;
use crate::relay::directory::RecipientDirectory;
use crate::telegram::traits::{InlineKeyboard, UserId};

/// Prefix of recipient selection payloads (`target_<label>`)
pub const TARGET_PREFIX: &str = "target_";

/// Slash command types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register and show the main menu
    Start,

    /// Show help
    Help,

    /// Show the recipient menu
    Send,

    /// Uptime and user count
    Status,

    /// Privacy policy
    Privacy,

    /// About the bot
    About,

    /// Message every registered user (admin)
    Broadcast { text: String },

    /// Ask the supervisor to restart the bot (admin)
    Restart,

    /// Unknown command
    Unknown(String),
}

impl Command {
    /// (syntax, description) for help listings
    pub fn help_text(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Command::Start => Some(("/start", "Start the bot")),
            Command::Help => Some(("/help", "Show this help")),
            Command::Send => Some(("/send", "Send an anonymous message")),
            Command::Status => Some(("/status", "Show bot status")),
            Command::Privacy => Some(("/privacy", "Privacy policy")),
            Command::About => Some(("/about", "About this bot")),
            Command::Broadcast { .. } => {
                Some(("/broadcast <text>", "Send a message to all users"))
            }
            Command::Restart => Some(("/restart", "Restart the bot")),
            Command::Unknown(_) => None,
        }
    }

    /// Allow-list check required before running this command
    pub fn privileged_action(&self) -> Option<PrivilegedAction> {
        match self {
            Command::Broadcast { .. } => Some(PrivilegedAction::Broadcast),
            Command::Restart => Some(PrivilegedAction::Restart),
            _ => None,
        }
    }

    fn user_commands() -> [Command; 6] {
        [
            Command::Start,
            Command::Send,
            Command::Help,
            Command::Status,
            Command::Privacy,
            Command::About,
        ]
    }

    fn admin_commands() -> [Command; 2] {
        [
            Command::Broadcast {
                text: String::new(),
            },
            Command::Restart,
        ]
    }
}

/// Parse a slash command. `None` for text that is not a command.
///
/// Accepts the `/command@botname` form Telegram uses in groups.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };
    let name = head.split('@').next().unwrap_or(head);

    let command = match name {
        "/start" => Command::Start,
        "/help" => Command::Help,
        "/send" => Command::Send,
        "/status" => Command::Status,
        "/privacy" => Command::Privacy,
        "/about" | "/developer_info" => Command::About,
        "/broadcast" => Command::Broadcast {
            text: rest.to_string(),
        },
        "/restart" => Command::Restart,
        _ => Command::Unknown(name.to_string()),
    };
    Some(command)
}

/// Inline keyboard selections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    MenuSend,
    MenuHelp,
    MenuStatus,
    MenuAdmin,
    MenuMain,
    AdminStats,
    AdminBroadcast,
    AdminRestart,
    /// Recipient picked by label
    Target(String),
    Unknown(String),
}

impl Callback {
    /// Allow-list check required before acting on this selection
    pub fn privileged_action(&self) -> Option<PrivilegedAction> {
        match self {
            Callback::AdminBroadcast => Some(PrivilegedAction::Broadcast),
            Callback::AdminRestart => Some(PrivilegedAction::Restart),
            Callback::MenuAdmin | Callback::AdminStats => Some(PrivilegedAction::AdminPanel),
            _ => None,
        }
    }
}

pub fn parse_callback(payload: &str) -> Callback {
    match payload {
        "menu_send" => Callback::MenuSend,
        "menu_help" => Callback::MenuHelp,
        "menu_status" => Callback::MenuStatus,
        "menu_admin" => Callback::MenuAdmin,
        "menu_main" => Callback::MenuMain,
        "admin_stats" => Callback::AdminStats,
        "admin_broadcast" => Callback::AdminBroadcast,
        "admin_restart" => Callback::AdminRestart,
        other => match other.strip_prefix(TARGET_PREFIX) {
            Some(label) if !label.is_empty() => Callback::Target(label.to_string()),
            _ => Callback::Unknown(other.to_string()),
        },
    }
}

// ============================================================================
// Keyboards
// ============================================================================

pub fn main_menu(is_admin: bool) -> InlineKeyboard {
    let keyboard = InlineKeyboard::new()
        .button("📝 Send a message", "menu_send")
        .button("ℹ️ Help", "menu_help")
        .button("📊 Bot status", "menu_status");
    if is_admin {
        keyboard.button("🛠 Admin panel", "menu_admin")
    } else {
        keyboard
    }
}

/// One button per recipient, in directory order
pub fn recipient_menu(directory: &RecipientDirectory) -> InlineKeyboard {
    directory
        .iter()
        .fold(InlineKeyboard::new(), |keyboard, recipient| {
            keyboard.button(
                format!("👤 {}", recipient.display_name),
                format!("{}{}", TARGET_PREFIX, recipient.label),
            )
        })
        .button("🔙 Back", "menu_main")
}

pub fn help_menu() -> InlineKeyboard {
    InlineKeyboard::new()
        .button("📝 Send a message", "menu_send")
        .button("📊 Bot status", "menu_status")
}

pub fn admin_menu() -> InlineKeyboard {
    InlineKeyboard::new()
        .button("📢 Broadcast", "admin_broadcast")
        .button("🔄 Restart", "admin_restart")
        .button("📊 Statistics", "admin_stats")
        .button("🔙 Back", "menu_main")
}

pub fn back_to_admin() -> InlineKeyboard {
    InlineKeyboard::new().button("🔙 Back", "menu_admin")
}

// ============================================================================
// Texts
// ============================================================================

pub fn welcome_text() -> &'static str {
    "👋 Hi! I deliver anonymous messages.\n\n\
     🔒 Pick a recipient and write your message; they will not see who sent it.\n\
     📱 Use the buttons below:"
}

pub fn help_text(is_admin: bool) -> String {
    let mut text = String::from("📖 Available commands:\n\n");
    for command in Command::user_commands() {
        if let Some((syntax, description)) = command.help_text() {
            text.push_str(&format!("{} - {}\n", syntax, description));
        }
    }
    text.push_str(
        "\n❗️ How to send an anonymous message:\n\
         1️⃣ Use /send or the «Send a message» button\n\
         2️⃣ Pick a recipient\n\
         3️⃣ Write your message\n\n\
         ✅ Your message is delivered without your name",
    );

    if is_admin {
        text.push_str("\n\n🔧 Admin commands:\n");
        for command in Command::admin_commands() {
            if let Some((syntax, description)) = command.help_text() {
                text.push_str(&format!("{} - {}\n", syntax, description));
            }
        }
    }
    text
}

pub fn status_text(uptime: &str, users: usize, is_admin: bool) -> String {
    let mut text = format!(
        "✅ Bot is running\n⏱ Uptime: {}\n📊 Users: {}",
        uptime, users
    );
    if is_admin {
        text.push_str("\n\n🔧 Admin mode");
    }
    text
}

pub fn admin_stats_text(uptime: &str, users: usize, pending: usize, you: UserId) -> String {
    format!(
        "📊 Bot statistics:\n\n\
         ⏱ Uptime: {}\n\
         👥 Users: {}\n\
         🛂 Pending join checks: {}\n\
         🆔 Your ID: {}",
        uptime, users, pending, you
    )
}

pub fn privacy_text() -> &'static str {
    "📜 Privacy policy\n\n\
     1. Collection: only the user ids needed to deliver messages are kept, \
     in memory, until the bot restarts.\n\n\
     2. Anonymity: recipients never see who wrote to them. Message text is \
     not logged.\n\n\
     3. Replies: the link back to a sender is sealed inside the delivered \
     message and can only be opened by this bot.\n\n\
     4. Changes: this policy may change at any time."
}

pub fn about_text() -> String {
    format!(
        "ℹ️ veilpost {}\n\nAnonymous relay and join verification bot.",
        env!("CARGO_PKG_VERSION")
    )
}

pub fn msg_choose_recipient() -> &'static str {
    "❓ Who should receive your message?"
}

pub fn msg_recipient_selected(display_name: &str) -> String {
    format!("✅ {} selected. Now write your message:", display_name)
}

pub fn msg_relayed() -> &'static str {
    "✅ Message sent anonymously!"
}

pub fn msg_reply_sent() -> &'static str {
    "✅ Reply sent!"
}

pub fn msg_broadcast_usage() -> &'static str {
    "❗️ Put the message text after the command: /broadcast <text>"
}

pub fn msg_broadcast_done(delivered: usize, failed: usize) -> String {
    if failed == 0 {
        format!("✅ Message sent to {} user(s)", delivered)
    } else {
        format!(
            "✅ Message sent to {} user(s), {} failed",
            delivered, failed
        )
    }
}

pub fn msg_restarting() -> &'static str {
    "🔄 Restarting the bot..."
}

pub fn msg_unknown_command() -> &'static str {
    "🤷 Unknown command. See /help"
}
