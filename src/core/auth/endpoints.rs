const MS_DEVICE_CODE_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/devicecode";
const MS_TOKEN_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
const MS_AUTHORIZE_URL: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/authorize";
const XBL_AUTH_URL: &str = "https://user.auth.xboxlive.com/user/authenticate";
const XSTS_AUTH_URL: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
const MC_LOGIN_URL: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
const MC_ENTITLEMENTS_URL: &str = "https://api.minecraftservices.com/entitlements/mcstore";
const MC_PROFILE_URL: &str = "https://api.minecraftservices.com/minecraft/profile";

/// Service URLs used by the sign-in chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub device_code: String,
    pub token: String,
    pub authorize: String,
    pub xbox_live: String,
    pub xsts: String,
    pub minecraft_login: String,
    pub entitlements: String,
    pub profile: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            device_code: MS_DEVICE_CODE_URL.into(),
            token: MS_TOKEN_URL.into(),
            authorize: MS_AUTHORIZE_URL.into(),
            xbox_live: XBL_AUTH_URL.into(),
            xsts: XSTS_AUTH_URL.into(),
            minecraft_login: MC_LOGIN_URL.into(),
            entitlements: MC_ENTITLEMENTS_URL.into(),
            profile: MC_PROFILE_URL.into(),
        }
    }
}

impl AuthEndpoints {
    /// Every endpoint under one base URL, with the path each service uses.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            device_code: format!("{}/oauth2/v2.0/devicecode", base),
            token: format!("{}/oauth2/v2.0/token", base),
            authorize: format!("{}/oauth2/v2.0/authorize", base),
            xbox_live: format!("{}/user/authenticate", base),
            xsts: format!("{}/xsts/authorize", base),
            minecraft_login: format!("{}/authentication/login_with_xbox", base),
            entitlements: format!("{}/entitlements/mcstore", base),
            profile: format!("{}/minecraft/profile", base),
        }
    }
}
