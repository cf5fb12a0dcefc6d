//! Console output for the operator.

use std::fmt;
use std::net::IpAddr;

const RULE_WIDTH: usize = 70;

/// Line printed once the server has stopped.
pub const SHUTDOWN_MESSAGE: &str = "\n\n✅ Server stopped gracefully";

/// Startup banner with the URLs to open on this machine and on phones.
pub struct Banner {
    pub port: u16,
    pub lan_ip: IpAddr,
}

impl Banner {
    pub fn new(port: u16, lan_ip: IpAddr) -> Self {
        Self { port, lan_ip }
    }

    pub fn local_url(&self) -> String {
        format!("https://localhost:{}", self.port)
    }

    pub fn lan_url(&self) -> String {
        format!("https://{}:{}", self.lan_ip, self.port)
    }
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);

        writeln!(f, "{rule}")?;
        writeln!(f, "🔒 HTTPS Server Started Successfully!")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "\n📱 Access from THIS device:")?;
        writeln!(f, "   {}", self.local_url())?;
        writeln!(f, "\n📱 Access from OTHER devices on same network:")?;
        writeln!(f, "   {}", self.lan_url())?;
        writeln!(f, "\n⚠️  IMPORTANT for mobile devices:")?;
        writeln!(
            f,
            "   1. Your browser will show a security warning (self-signed certificate)"
        )?;
        writeln!(f, "   2. Click 'Advanced' or 'Details'")?;
        writeln!(f, "   3. Click 'Proceed' or 'Accept Risk and Continue'")?;
        writeln!(f, "   4. This is normal for local development!")?;
        writeln!(f, "\n💡 The camera will now work on mobile devices!")?;
        writeln!(f, "\n🛑 Press Ctrl+C to stop the server")?;
        writeln!(f, "{rule}")
    }
}
