use rand::prelude::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Levels of stealth applied to the browser session.
pub enum StealthProfile {
    Lightweight,
    Balanced,
    Maximum,
}

impl Default for StealthProfile {
    fn default() -> Self {
        StealthProfile::Balanced
    }
}

/// Snapshot of user agent, viewport, and locale characteristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAgentProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub platform: String,
    pub languages: Vec<String>,
}

/// Pick a plausible desktop profile for this browser session.
pub fn pick_session_profile() -> UserAgentProfile {
    let profiles = vec![
        UserAgentProfile {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            viewport: (1920, 1080),
            platform: "Win32".to_string(),
            languages: vec!["en-US".to_string(), "en".to_string()],
        },
        UserAgentProfile {
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            viewport: (1440, 900),
            platform: "MacIntel".to_string(),
            languages: vec!["en-US".to_string(), "en".to_string()],
        },
    ];
    let mut rng = rand::thread_rng();
    profiles.choose(&mut rng).cloned().unwrap_or_else(|| profiles[0].clone())
}

/// Construct Chrome command-line arguments for a given stealth profile
/// and fingerprint.
pub fn build_stealth_arguments(
    profile: &StealthProfile,
    user_profile: &UserAgentProfile,
) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        "--disable-extensions".to_string(),
        "--disable-plugins-discovery".to_string(),
        format!("--user-agent={}", user_profile.user_agent),
        format!(
            "--window-size={},{}",
            user_profile.viewport.0, user_profile.viewport.1
        ),
        format!("--lang={}", user_profile.languages.join(",")),
    ];
    if let StealthProfile::Maximum = profile {
        args.push("--disable-gpu".to_string());
    }
    args
}

/// JavaScript evasions applied at page load to reduce automation signals.
pub struct StealthScripts;

impl StealthScripts {
    pub fn get_core_evasions() -> &'static str {
        r#"
            Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
            Object.defineProperty(navigator, 'plugins', { get: () => [1,2,3] });
            Object.defineProperty(navigator, 'languages', {
                get: () => ['en-US', 'en']
            });
            if (!window.chrome) window.chrome = { runtime: {} };
        "#
    }

    pub fn get_canvas_evasions() -> &'static str {
        r#"
            const getContext = HTMLCanvasElement.prototype.getContext;
            HTMLCanvasElement.prototype.getContext = function(type,...args){
                const ctx = getContext.call(this,type,...args);
                if(type==='2d' && ctx) {
                    const origToDataURL=this.toDataURL;
                    this.toDataURL=function(...a){
                        const imgdata=ctx.getImageData(0,0,this.width,this.height);
                        for(let i=0;i<imgdata.data.length;i+=4){
                            if(Math.random()<0.001)imgdata.data[i]+=Math.random()<0.5?-1:1;
                        }
                        ctx.putImageData(imgdata,0,0);
                        return origToDataURL.call(this,...a);
                    };
                }
                return ctx;
            };
        "#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_carry_fingerprint() {
        let profile = pick_session_profile();
        let args = build_stealth_arguments(&StealthProfile::Balanced, &profile);
        assert!(args.iter().any(|a| a.starts_with("--user-agent=")));
        assert!(args.iter().any(|a| a.starts_with("--window-size=")));
        assert!(!args.iter().any(|a| a == "--headless"));
    }

    #[test]
    fn maximum_profile_disables_gpu() {
        let profile = pick_session_profile();
        let args = build_stealth_arguments(&StealthProfile::Maximum, &profile);
        assert!(args.iter().any(|a| a == "--disable-gpu"));
    }
}
