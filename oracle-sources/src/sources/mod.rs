pub mod binance;
pub mod coinbase;
pub mod coingecko;
pub mod coinmarketcap;
pub mod kraken;
pub mod okex;

pub use binance::BinanceAdapter;
pub use coinbase::CoinbaseAdapter;
pub use coingecko::CoinGeckoAdapter;
pub use coinmarketcap::CoinMarketCapAdapter;
pub use kraken::KrakenAdapter;
pub use okex::OkexAdapter;
