pub mod briefing;

pub use briefing::{
    BriefingConfig, DigestSettings, FeedSettings, MailSettings, RosterSettings,
};
