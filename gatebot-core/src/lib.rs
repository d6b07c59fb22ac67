pub mod command;
pub mod eligibility;
pub mod model;

pub use command::{
    authorize, parse_admin_input, AdminAction, AdminCommand, AuthorizedAdmin, ValidationError,
};
pub use eligibility::{ReferralOutcome, WithdrawOutcome, REFERRAL_QUOTA};
pub use model::{
    ChannelDescriptor, ConfigDocument, FolderDescriptor, UserDocument, UserId, UserRecord,
};
