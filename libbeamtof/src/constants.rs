// IFBeam service
pub const IFBEAM_DEFAULT_URL: &str = "https://dbdata3vm.fnal.gov:9443/ifbeam/data/data";
pub const IFBEAM_DEFAULT_EVENT: &str = "z,pdune";
pub const IFBEAM_FORMAT: &str = "csv";

// CSV layout of an IFBeam response
pub const CSV_MIN_FIELDS: usize = 4; // rows with fewer fields are malformed
pub const CSV_CLOCK_COLUMN: usize = 3;
pub const CSV_FIRST_VALUE_COLUMN: usize = 5;

// Timestamp conversion: the TDC coarse counter ticks at 125 MHz, the fine
// counter divides one coarse tick into 512 parts.
pub const NS_PER_SECOND: f64 = 1e9;
pub const NS_PER_COARSE_TICK: f64 = 8.0;
pub const FRAC_PER_NS: f64 = 512.0;
// seconds[] arrays hold two words per sample, the second is the seconds count
pub const SECONDS_WORDS_PER_SAMPLE: usize = 2;
pub const SECONDS_WORD_OFFSET: usize = 1;

// Device naming
pub const TRIGGER_PREFIX: &str = "dip/acc/NORTH/NP02/BI/TDC/GeneralTrigger";
pub const TOF_PREFIX: &str = "dip/acc/NORTH/NP02/BI/XTOF";
pub const TOF_UPSTREAM_A: &str = "XBTF022638A";
pub const TOF_UPSTREAM_B: &str = "XBTF022638B";
pub const TOF_DOWNSTREAM_A: &str = "XBTF022670A";
pub const TOF_DOWNSTREAM_B: &str = "XBTF022670B";
pub const CHERENKOV_PREFIX: &str = "dip/acc/NORTH/NP02/BI/XCET";
pub const XCET_PREFIX: &str = "dip/acc/NORTH/NP02/BI";
pub const CHERENKOV_HIGH_PRESSURE: &str = "XCET021667";
pub const CHERENKOV_LOW_PRESSURE: &str = "XCET021669";
pub const MOMENTUM_PREFIX: &str = "dip/acc/NORTH/NP02/POW/CALC/MOMENTUM";

// Variable suffixes
pub const SECONDS_VAR: &str = ":seconds[]";
pub const COARSE_VAR: &str = ":coarse[]";
pub const FRAC_VAR: &str = ":frac[]";
pub const COUNT_VAR: &str = ":timestampCount";
pub const CKOV_COUNTS_VAR: &str = ":counts";
pub const CKOV_TRIG_COUNTS_VAR: &str = ":countsTrig";
pub const CKOV_PRESSURE_VAR: &str = ":pressure";
pub const XCET_SECONDS_VAR: &str = ":SECONDS";
pub const XCET_FRAC_VAR: &str = ":FRAC";
pub const XCET_COARSE_VAR: &str = ":COARSE";
pub const MOMENTUM_REF_VAR: &str = ":momentum_ref";
pub const MOMENTUM_MEAS_VAR: &str = ":momentum_meas";

// Coincidence windows (ns)
pub const DEFAULT_DOWNSTREAM_TO_TRIGGER_NS: f64 = 60.0;
pub const DEFAULT_UPSTREAM_TO_DOWNSTREAM_NS: f64 = 500.0;
pub const DEFAULT_XCET_WINDOW_NS: f64 = 500.0;

// XCET status codes
pub const XCET_STATUS_NOT_FETCHED: i32 = -1;
pub const XCET_STATUS_NO_MATCH: i32 = 0;
pub const XCET_STATUS_MATCHED: i32 = 1;
pub const XCET_NO_TIMESTAMP: f64 = -1.0;

// Offline beam event cut (ns)
pub const BEAM_EVENT_TOF_MIN: f64 = 0.0;
pub const BEAM_EVENT_TOF_MAX: f64 = 500.0;

// TIMBER variables and the zone of their local dates
pub const TIMBER_PRIMARY_VAR: &str = "SPS.T2:INTENSITY";
pub const TIMBER_SECONDARY_VAR: &str = "XTIM.SX.WE-CT:Acquisition:acqC";
pub const DEFAULT_LOCAL_TIMEZONE: &str = "Europe/Zurich";
