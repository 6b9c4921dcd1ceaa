use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TeacherLogin {
    #[validate(email(message = "email is not valid"))]
    pub(crate) email: String,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub(crate) password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AdminLogin {
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub(crate) password: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminPasswordChange {
    #[serde(alias = "newPassword")]
    pub(crate) new_password: String,
}
