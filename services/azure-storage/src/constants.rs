use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

// Headers used in azure storage services.
pub const X_MS_DATE: &str = "x-ms-date";
pub const X_MS_VERSION: &str = "x-ms-version";
pub const DATA_SERVICE_VERSION: &str = "dataserviceversion";
pub const MAX_DATA_SERVICE_VERSION: &str = "maxdataserviceversion";
pub const X_MS_CONTINUATION_NEXT_TABLE_NAME: &str = "x-ms-continuation-nexttablename";
pub const X_MS_CONTINUATION_NEXT_PARTITION_KEY: &str = "x-ms-continuation-nextpartitionkey";
pub const X_MS_CONTINUATION_NEXT_ROW_KEY: &str = "x-ms-continuation-nextrowkey";

pub const TABLE_ACCEPT: &str = "application/json;odata=nometadata";
pub const TABLE_DATA_SERVICE_VERSION: &str = "3.0;NetFx";

/// Service version sent as `x-ms-version` unless configured otherwise.
pub const DEFAULT_SERVICE_VERSION: &str = "2014-02-14";

/// Last service version that renders a zero Content-Length as `0` in the string to sign.
pub const LAST_VERSION_WITH_ZERO_CONTENT_LENGTH: &str = "2014-02-14";

/// DNS suffix of the public cloud, used when an account's endpoints don't tell otherwise.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "windows.net";

pub const SERVICE_PROPERTIES_PATH: &str = "/?restype=service&comp=properties";

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const MANAGEMENT_API_VERSION: &str = "2023-01-01";
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

// Env values used by the storage tooling.
pub const AZURE_STORAGE_ENDPOINT_SUFFIX: &str = "AZURE_STORAGE_ENDPOINT_SUFFIX";
pub const AZURE_STORAGE_SERVICE_VERSION: &str = "AZURE_STORAGE_SERVICE_VERSION";
pub const AZURE_STORAGE_CONNECTION_STRING: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const AZURE_STORAGE_ACCOUNT: &str = "AZURE_STORAGE_ACCOUNT";
pub const AZURE_STORAGE_KEY: &str = "AZURE_STORAGE_KEY";
pub const AZURE_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const AZURE_RESOURCE_GROUP: &str = "AZURE_RESOURCE_GROUP";
pub const AZURE_ACCESS_TOKEN: &str = "AZURE_ACCESS_TOKEN";
pub const AZURE_MANAGEMENT_ENDPOINT: &str = "AZURE_MANAGEMENT_ENDPOINT";
pub const AZURE_IMDS_ENDPOINT: &str = "AZURE_IMDS_ENDPOINT";
pub const SAPMON_POLL_TIMEOUT_SECS: &str = "SAPMON_POLL_TIMEOUT_SECS";
pub const SAPMON_POLL_INTERVAL_SECS: &str = "SAPMON_POLL_INTERVAL_SECS";

/// AsciiSet for [Azure storage query values](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
pub static AZURE_QUERY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'/')
    .remove(b'~');
