use ethers::prelude::*;

abigen!(
    FederationContract,
    "$CARGO_MANIFEST_DIR/abis/federation.abi.json"
);
