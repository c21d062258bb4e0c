pub mod config;

pub use config::{
    get_config_dir, init_config, load_config, save_config, Config, ServerConfig, UiConfig,
    UploadConfig,
};
