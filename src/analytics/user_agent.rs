//! User agent classification
//!
//! Browser and OS detection is delegated to `woothee`. Device class is
//! derived from a set of traits that can overlap (an iPad is reported as a
//! smartphone, a crawler can announce itself as mobile), so the class is
//! picked by a fixed precedence: tablet, mobile, desktop, bot, unknown.

use woothee::parser::{Parser, WootheeResult};

use crate::analytics::models::UserAgentInfo;

/// Placeholder woothee uses for undetected fields
const UNKNOWN: &str = "UNKNOWN";

/// Tokens that identify tablets woothee folds into "smartphone"
const TABLET_TOKENS: &[&str] = &["iPad", "Tablet", "Kindle", "Silk/", "PlayBook"];

/// Lowercase crawler markers for agents woothee does not know about.
/// "bot" only counts as a product token (`ExampleBot/1.0`, `bot;`) so that
/// device names such as "CUBOT" stay untouched.
const BOT_TOKENS: &[&str] = &["bot/", "bot;", "bot)", "crawler", "spider", "slurp", "+http"];

/// Whole words that mark a crawler on their own
const BOT_WORDS: &[&str] = &["bot", "robot"];

#[derive(Debug, Default, Clone, Copy)]
struct DeviceTraits {
    tablet: bool,
    mobile: bool,
    desktop: bool,
    bot: bool,
}

impl DeviceTraits {
    fn detect(user_agent: &str, parsed: Option<&WootheeResult<'_>>) -> Self {
        let category = parsed.map(|p| p.category).unwrap_or(UNKNOWN);
        let lowercase = user_agent.to_ascii_lowercase();

        let tablet = TABLET_TOKENS.iter().any(|t| user_agent.contains(t))
            || (user_agent.contains("Android") && !user_agent.contains("Mobile"));

        Self {
            tablet,
            mobile: matches!(category, "smartphone" | "mobilephone") || user_agent.contains("Mobi"),
            desktop: category == "pc",
            bot: category == "crawler" || looks_like_crawler(&lowercase),
        }
    }

    fn device_type(&self) -> &'static str {
        if self.tablet {
            "tablet"
        } else if self.mobile {
            "mobile"
        } else if self.desktop {
            "desktop"
        } else if self.bot {
            "bot"
        } else {
            "unknown"
        }
    }
}

/// Classify a raw `User-Agent` header value
///
/// Never fails: unrecognised agents yield empty names and the "unknown"
/// device class.
pub fn classify(user_agent: &str) -> UserAgentInfo {
    if user_agent.trim().is_empty() {
        return UserAgentInfo {
            device_type: "unknown".to_string(),
            ..Default::default()
        };
    }

    let parsed = Parser::new().parse(user_agent);
    let traits = DeviceTraits::detect(user_agent, parsed.as_ref());

    let mut info = UserAgentInfo {
        device_type: traits.device_type().to_string(),
        is_bot: traits.bot,
        ..Default::default()
    };

    if let Some(result) = parsed {
        info.browser = known(result.name);
        info.browser_version = known(result.version);
        info.os = known(result.os);
        info.os_version = known(&result.os_version);

        // HTTP libraries come back as name "HTTP Library" with the library
        // name in the version slot (`curl`, `Wget`, ...).
        if !info.browser_version.is_empty() && !is_version(&info.browser_version) {
            let product = std::mem::take(&mut info.browser_version);
            if result.category == UNKNOWN {
                info.browser_version = version_after(user_agent, &product);
                info.browser = product;
            }
        }
    }

    info
}

fn looks_like_crawler(lowercase: &str) -> bool {
    BOT_TOKENS.iter().any(|t| lowercase.contains(t))
        || lowercase
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| BOT_WORDS.contains(&word))
}

fn is_version(value: &str) -> bool {
    value.starts_with(|c: char| c.is_ascii_digit())
}

/// Version following `product/` in the agent string, empty when absent
fn version_after(user_agent: &str, product: &str) -> String {
    let lowercase = user_agent.to_ascii_lowercase();
    let marker = format!("{}/", product.to_ascii_lowercase());

    let Some(start) = lowercase.find(&marker) else {
        return String::new();
    };

    let version: String = user_agent[start + marker.len()..]
        .chars()
        .take_while(|c| !c.is_whitespace() && !matches!(c, ';' | ')' | '('))
        .collect();

    if is_version(&version) {
        version
    } else {
        String::new()
    }
}

fn known(value: &str) -> String {
    if value == UNKNOWN {
        String::new()
    } else {
        value.to_string()
    }
}
