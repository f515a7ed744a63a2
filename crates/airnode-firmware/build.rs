fn main() {
    // Build-time defaults may come from a local, git-ignored .env file.
    let _ = dotenvy::dotenv();
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-env-changed=AIRNODE_AP_SSID");

    if let Ok(ssid) = std::env::var("AIRNODE_AP_SSID") {
        println!("cargo:rustc-env=AIRNODE_AP_SSID={ssid}");
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
